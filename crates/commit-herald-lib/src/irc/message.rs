//! Inbound line parsing and outbound command serialisation.

use super::framing::MAX_LINE_LEN;

/// Marker the server emits while probing our ident service; answering it
/// with identification is how sign-in starts.
pub const IDENT_NOTICE: &str = "No Ident response";

/// Reply codes consumed by the handshake.
pub const ERR_NICKNAMEINUSE: u16 = 433;
pub const RPL_ENDOFMOTD: u16 = 376;
pub const RPL_ENDOFNAMES: u16 = 366;

/// One inbound line split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line<'a> {
    pub prefix: Option<&'a str>,
    pub command: &'a str,
    /// Middle parameters followed by the trailing one (without its colon).
    pub params: Vec<&'a str>,
}

/// Split a raw line into prefix, command and parameters.
///
/// Returns `None` for lines without a command.
pub fn parse_line(raw: &str) -> Option<Line<'_>> {
    let mut rest = raw.trim_start_matches(' ');
    let mut prefix = None;
    if let Some(stripped) = rest.strip_prefix(':') {
        let (p, r) = stripped.split_once(' ')?;
        prefix = Some(p);
        rest = r.trim_start_matches(' ');
    }

    let (command, mut rest) = match rest.split_once(' ') {
        Some((c, r)) => (c, r),
        None => (rest, ""),
    };
    if command.is_empty() {
        return None;
    }

    let mut params = Vec::new();
    loop {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            break;
        }
        if let Some(trailing) = rest.strip_prefix(':') {
            params.push(trailing);
            break;
        }
        match rest.split_once(' ') {
            Some((p, r)) => {
                params.push(p);
                rest = r;
            }
            None => {
                params.push(rest);
                break;
            }
        }
    }

    Some(Line {
        prefix,
        command,
        params,
    })
}

/// Numeric reply code of a line, if its command is exactly three digits.
pub fn reply_code(raw: &str) -> Option<u16> {
    let line = parse_line(raw)?;
    let cmd = line.command;
    if cmd.len() == 3 && cmd.bytes().all(|b| b.is_ascii_digit()) {
        cmd.parse().ok()
    } else {
        None
    }
}

/// Token of a keepalive probe, if the line is one.
pub fn ping_token(raw: &str) -> Option<&str> {
    let line = parse_line(raw)?;
    if line.command.eq_ignore_ascii_case("PING") {
        line.params.first().copied()
    } else {
        None
    }
}

/// Outbound commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Nick(String),
    /// User registration; username and real name are both the nickname.
    User(String),
    Join(String),
    Privmsg { target: String, text: String },
    Pong(String),
    Quit(String),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Nick(_) => "NICK",
            Command::User(_) => "USER",
            Command::Join(_) => "JOIN",
            Command::Privmsg { .. } => "PRIVMSG",
            Command::Pong(_) => "PONG",
            Command::Quit(_) => "QUIT",
        }
    }

    pub fn payload(&self) -> String {
        match self {
            Command::Nick(nick) => nick.clone(),
            Command::User(nick) => format!("{} * * :{}", nick, nick),
            Command::Join(channel) => channel.clone(),
            Command::Privmsg { target, text } => format!("{} :{}", target, text),
            Command::Pong(token) => format!(":{}", token),
            Command::Quit(farewell) => format!(":{}", farewell),
        }
    }
}

/// Serialise `"<name> <payload>\r\n"`.
pub fn encode(name: &str, payload: &str) -> Vec<u8> {
    format!("{} {}\r\n", name, payload).into_bytes()
}

/// Make free text safe to carry in a single `PRIVMSG` to `target`.
///
/// Line breaks would terminate the frame early and let the rest be read as a
/// new command, so they are replaced with spaces. The result is truncated on a
/// character boundary so the complete wire line fits in [`MAX_LINE_LEN`].
pub fn fit_privmsg(target: &str, text: &str) -> String {
    let overhead = "PRIVMSG ".len() + target.len() + " :".len() + 2;
    let budget = MAX_LINE_LEN.saturating_sub(overhead);

    let cleaned: String = text
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();
    if cleaned.len() <= budget {
        return cleaned;
    }
    let mut end = budget;
    while !cleaned.is_char_boundary(end) {
        end -= 1;
    }
    cleaned[..end].to_string()
}
