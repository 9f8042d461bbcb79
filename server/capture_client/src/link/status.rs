/// 解析済みのステータス行
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLine {
    /// `Camera Ready!`
    Ready,
    /// `ERROR: ...`
    Error(String),
    /// `Length: N` (FIFO の長さ)
    Length(u32),
    /// `Payload: N` (これから送られるバイト数)
    Payload(u32),
    /// その他の情報
    Info(String),
}

impl StatusLine {
    /// `ACK CMD` と `END` の間のテキストを解析する
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text == "Camera Ready!" {
            return StatusLine::Ready;
        }
        if text.starts_with("ERROR") {
            return StatusLine::Error(text.to_string());
        }
        if let Some(n) = parse_count(text, "Length:") {
            return StatusLine::Length(n);
        }
        if let Some(n) = parse_count(text, "Payload:") {
            return StatusLine::Payload(n);
        }
        StatusLine::Info(text.to_string())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StatusLine::Error(_))
    }
}

fn parse_count(text: &str, label: &str) -> Option<u32> {
    text.strip_prefix(label)?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_lines() {
        assert_eq!(StatusLine::parse("Camera Ready!"), StatusLine::Ready);
        assert_eq!(StatusLine::parse("Length: 123456"), StatusLine::Length(123456));
        assert_eq!(StatusLine::parse(" Payload: 42 "), StatusLine::Payload(42));
        assert_eq!(
            StatusLine::parse("ERROR: Capture Timeout"),
            StatusLine::Error("ERROR: Capture Timeout".to_string())
        );
    }

    #[test]
    fn test_malformed_counts_are_info() {
        assert_eq!(
            StatusLine::parse("Length: many"),
            StatusLine::Info("Length: many".to_string())
        );
        assert!(!StatusLine::parse("Capture Done.").is_error());
    }
}
