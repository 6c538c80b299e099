//! TmuxSessionInfo, list-sessions format string, and parser.

use crate::error::TmuxError;

/// Tab-delimited format string for `tmux list-sessions -F`.
///
/// The session name comes first and may contain anything tmux accepts
/// (including zero-width channel markers), so lines are split from the right.
pub const LIST_SESSIONS_FORMAT: &str =
    "#{session_name}\t#{session_windows}\t#{session_attached}\t#{session_created}";

const FIELDS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TmuxSessionInfo {
    /// Raw session name, markers included.
    pub name: String,
    pub windows: u32,
    /// At least one client is attached.
    pub attached: bool,
    /// Unix seconds.
    pub created: Option<i64>,
}

/// Parse the raw output of `tmux list-sessions -F <FORMAT>`.
pub fn parse_list_sessions_output(output: &str) -> Result<Vec<TmuxSessionInfo>, TmuxError> {
    let mut sessions = Vec::new();
    for (idx, line) in output.lines().enumerate() {
        // Only strip the line terminator: markers must survive untouched.
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        sessions.push(parse_line(line, idx + 1)?);
    }
    Ok(sessions)
}

fn parse_line(line: &str, line_num: usize) -> Result<TmuxSessionInfo, TmuxError> {
    let mut parts: Vec<&str> = line.rsplitn(FIELDS, '\t').collect();
    if parts.len() < FIELDS {
        return Err(TmuxError::ParseError {
            line_num,
            detail: format!(
                "expected {FIELDS} tab-separated fields, got {}",
                parts.len()
            ),
        });
    }
    parts.reverse();

    let name = parts[0];
    if name.is_empty() {
        return Err(TmuxError::ParseError {
            line_num,
            detail: "empty session name".to_string(),
        });
    }

    Ok(TmuxSessionInfo {
        name: name.to_string(),
        windows: parts[1].trim().parse().unwrap_or(0),
        attached: parts[2].trim().parse::<u32>().is_ok_and(|n| n > 0),
        created: parts[3].trim().parse().ok(),
    })
}
