use clap::Parser;

/// Signaling probe for a parley voice server.
///
/// Joins a channel over the signaling socket, checks codec compatibility,
/// measures round-trip latency, then leaves. No media is sent.
#[derive(Parser, Debug)]
#[command(name = "parley-probe", version, about)]
pub struct Args {
    /// Signaling URL override (ws:// or wss://).
    #[arg(short, long)]
    pub url: Option<String>,

    /// Voice channel to join.
    #[arg(short, long)]
    pub channel: String,

    /// Config file path override.
    #[arg(long)]
    pub config: Option<String>,

    /// Number of latency samples to take.
    #[arg(long, default_value_t = 5)]
    pub pings: u32,

    /// Log level override (debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

pub fn parse() -> Args {
    Args::parse()
}
