//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Parley Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[signaling]
# url = "wss://chat.example.org/voice"
# request_timeout_ms = 10000      # 500-60000
# heartbeat_interval_secs = 25    # 5-120
# reconnect_delay_secs = 1        # 1-60
# max_reconnect_delay_secs = 30   # 1-600

[voice]
# mode = "vad"                    # vad, ptt
# start_muted = false
# input_gain = 1.0                # 0.0-4.0
# echo_cancellation = true
# noise_suppression = true
# input_device = "default"

[voice.ptt]
# key = "Backquote"

[voice.detector]
# threshold = 0.015               # 0.0-1.0 (RMS)
# attack = 0.4                    # EMA coefficient while rising, (0, 1]
# release = 0.05                  # EMA coefficient while falling, (0, 1]
# hold_ms = 250                   # 0-5000

[latency]
# ping_interval_secs = 5          # 1-300
# ping_timeout_ms = 3000          # 100-60000
# good_below_ms = 100
# average_below_ms = 250

# [[ice_servers]]
# urls = ["turn:relay.example.org:3478"]
# username = ""
# credential = ""

[logging]
# level = "parley=info"
"##
    .to_string()
}
