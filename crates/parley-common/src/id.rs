pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Short hex token used to pair a signaling request with its reply.
pub fn new_correlation_id() -> String {
    let uuid = uuid::Uuid::new_v4();
    uuid.as_bytes()[..8]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_id_is_valid_uuid() {
        let id = new_id();
        let parsed = uuid::Uuid::parse_str(&id);
        assert!(parsed.is_ok());
        assert_eq!(parsed.unwrap().get_version_num(), 4);
    }

    #[test]
    fn new_id_is_unique() {
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
    }

    #[test]
    fn correlation_id_length() {
        let cid = new_correlation_id();
        assert_eq!(cid.len(), 16);
    }

    #[test]
    fn correlation_id_is_hex() {
        let cid = new_correlation_id();
        assert!(cid.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn correlation_id_is_unique() {
        let ids: std::collections::HashSet<String> =
            (0..256).map(|_| new_correlation_id()).collect();
        assert_eq!(ids.len(), 256);
    }
}
