use super::Error;

/// A complete ftp reply, possibly spanning multiple lines.
///
/// Multi-line replies look like:
/// ```text
/// 211-Status of /pub:
///  -rw-r--r--   1 ftp ftp 4 Jan  1 12:00 a.txt
/// 211 End of status
/// ```
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Reply {
    /// The 3-digit reply code.
    pub code: u16,
    /// Every line of the reply, without the trailing CRLF.
    pub lines: Vec<String>,
}

impl Reply {
    /// Build a reply from the status code and the raw body suppaftp read
    /// off the control connection.
    pub fn new(code: u32, body: &[u8]) -> Self {
        let lines = String::from_utf8_lossy(body)
            .lines()
            .map(|line| line.trim_end_matches('\r').to_owned())
            .filter(|line| !line.is_empty())
            .collect();

        Self {
            code: u16::try_from(code).unwrap_or_default(),
            lines,
        }
    }

    /// 1xx
    pub fn is_preliminary(&self) -> bool {
        self.code / 100 == 1
    }

    /// 2xx
    pub fn is_completion(&self) -> bool {
        self.code / 100 == 2
    }

    /// 3xx
    pub fn is_intermediate(&self) -> bool {
        self.code / 100 == 3
    }

    /// 2xx or 3xx.
    pub fn is_positive(&self) -> bool {
        self.is_completion() || self.is_intermediate()
    }

    /// The last line of the reply, which carries the final status text.
    pub fn text(&self) -> &str {
        self.lines.last().map(String::as_str).unwrap_or_default()
    }

    /// The text of the last line with the code stripped.
    pub fn message(&self) -> &str {
        let text = self.text();
        let code = self.code.to_string();

        match text.strip_prefix(code.as_str()) {
            Some(rest) if rest.is_empty() || rest.starts_with([' ', '-']) => {
                rest.get(1..).unwrap_or_default().trim()
            }
            _ => text.trim(),
        }
    }

    /// Lines between the opening and the closing line of a multi-line reply.
    pub fn body(&self) -> &[String] {
        if self.lines.len() > 2 {
            &self.lines[1..self.lines.len() - 1]
        } else {
            &[]
        }
    }

    pub(crate) fn into_command_error(self, command: &str) -> Error {
        Error::command(command, self.code, self.text())
    }
}
