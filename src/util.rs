/// Renders raw request bytes for logging, escaping anything that isn't
/// printable ASCII.
pub fn bytes_to_human_str(input: &[u8]) -> String {
    input.escape_ascii().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escaping() {
        assert_eq!(bytes_to_human_str(b"submit HIGH 1"), "submit HIGH 1");
        assert_eq!(bytes_to_human_str(b"a\r\n\xff"), "a\\r\\n\\xff");
    }
}
