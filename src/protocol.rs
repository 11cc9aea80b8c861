//! Line protocol definitions
//!
//! Client → server lines are colon-delimited (`CMD:...` commands or
//! `<target>:<msg-id>:<content>` chat lines). Server → client lines are
//! pipe-delimited and always start with a record type (`MSG`, `USERS`, ...).
//!
//! Only the leading fields are structural in either direction: whatever is
//! left after the last structural delimiter is content and kept verbatim,
//! delimiters included.

use std::fmt;

use crate::types::MessageId;

/// Sender name used for server-authored lines
pub const SYSTEM_SENDER: &str = "System";

/// Wire marker for "to everyone"
pub const EVERYONE: &str = "ALL";

/// Nickname prefix used by internal observer connections
pub const DEFAULT_OBSERVER_PREFIX: &str = "__LAUNCHER__";

const QUIT_PREFIX: &str = "CMD:QUIT";
const NAME_CHANGE_PREFIX: &str = "CMD:NAME_CHANGE:";
const AVATAR_PREFIX: &str = "CMD:AVATAR:";

/// Returns true if `name` can never be claimed by an ordinary client
///
/// Empty (after trimming), any casing of "system", or anything starting
/// with the observer prefix.
pub fn is_reserved_name(name: &str, observer_prefix: &str) -> bool {
    let name = name.trim();
    name.is_empty()
        || name.to_lowercase() == SYSTEM_SENDER.to_lowercase()
        || is_observer(name, observer_prefix)
}

/// Returns true if `name` belongs to an internal observer connection
pub fn is_observer(name: &str, observer_prefix: &str) -> bool {
    !observer_prefix.is_empty() && name.starts_with(observer_prefix)
}

/// Recipient of a chat line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every registered connection, the sender included
    Everyone,
    /// Exactly one nickname (case-sensitive)
    User(String),
}

impl Target {
    /// Interpret a raw target field. The everyone marker ignores case,
    /// nicknames do not.
    pub fn from_field(field: &str) -> Self {
        let field = field.trim();
        if field.eq_ignore_ascii_case(EVERYONE) {
            Target::Everyone
        } else {
            Target::User(field.to_string())
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Everyone => f.write_str(EVERYONE),
            Target::User(name) => f.write_str(name),
        }
    }
}

/// Client → Server line (after the handshake)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLine {
    /// `CMD:QUIT`
    Quit,
    /// `CMD:NAME_CHANGE:<new>`
    NameChange { new_name: String },
    /// `CMD:AVATAR:<url>`
    Avatar { url: String },
    /// `<target>:<msg-id>:<content>`
    Chat {
        target: Target,
        msg_id: String,
        content: String,
    },
}

impl ClientLine {
    /// Parse one trimmed line
    ///
    /// Returns `None` for lines that fit no form; those are dropped by the
    /// caller without a reply.
    pub fn parse(line: &str) -> Option<Self> {
        if line.starts_with(QUIT_PREFIX) {
            return Some(ClientLine::Quit);
        }
        if let Some(new_name) = line.strip_prefix(NAME_CHANGE_PREFIX) {
            return Some(ClientLine::NameChange {
                new_name: new_name.trim().to_string(),
            });
        }
        if let Some(url) = line.strip_prefix(AVATAR_PREFIX) {
            return Some(ClientLine::Avatar {
                url: url.trim().to_string(),
            });
        }

        let (target, rest) = line.split_once(':')?;
        let (msg_id, content) = rest.split_once(':')?;
        Some(ClientLine::Chat {
            target: Target::from_field(target),
            msg_id: msg_id.to_string(),
            content: content.to_string(),
        })
    }
}

/// Error codes carried by `ERR` lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Nickname is reserved or already registered
    NameTaken,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NameTaken => "NAME_TAKEN",
        }
    }

    fn from_wire(code: &str) -> Option<Self> {
        match code {
            "NAME_TAKEN" => Some(ErrorCode::NameTaken),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server → Client line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine {
    /// `MSG|<sender>|<target>|<id>|<content>`
    Msg {
        sender: String,
        target: String,
        id: String,
        content: String,
    },
    /// `USERS|System|ALL|<a,b,c>`
    Users { names: Vec<String> },
    /// `ERR|System|<who>|<code>`
    Err { who: String, code: ErrorCode },
    /// `ACK|System|<old>|NAME_CHANGED|<new>`
    Ack { old: String, new: String },
    /// `RENAME|<old>|<new>`
    Rename { old: String, new: String },
    /// `AVATAR|<who>|<url>`
    Avatar { who: String, url: String },
}

impl ServerLine {
    /// A system-authored chat message to everyone with a fresh id
    pub fn system(content: impl Into<String>) -> Self {
        ServerLine::Msg {
            sender: SYSTEM_SENDER.to_string(),
            target: EVERYONE.to_string(),
            id: MessageId::generate().to_string(),
            content: content.into(),
        }
    }

    pub fn joined(nickname: &str) -> Self {
        Self::system(format!("{} -> has joined the chat", nickname))
    }

    pub fn disconnected(nickname: &str) -> Self {
        Self::system(format!("{} -> has disconnected", nickname))
    }

    pub fn renamed(old: &str, new: &str) -> Self {
        Self::system(format!("{} has changed the user_name to-> {}", old, new))
    }

    pub fn name_taken(who: &str) -> Self {
        ServerLine::Err {
            who: who.to_string(),
            code: ErrorCode::NameTaken,
        }
    }

    /// Parse a server line the way clients do
    ///
    /// Field counts are checked before anything is interpreted; the last
    /// field of `MSG` swallows any further `|`.
    pub fn parse(line: &str) -> Option<Self> {
        let (kind, rest) = line.split_once('|')?;
        match kind {
            "MSG" => {
                let mut fields = rest.splitn(4, '|');
                let sender = fields.next()?;
                let target = fields.next()?;
                let id = fields.next()?;
                let content = fields.next()?;
                Some(ServerLine::Msg {
                    sender: sender.to_string(),
                    target: target.to_string(),
                    id: id.to_string(),
                    content: content.to_string(),
                })
            }
            "USERS" => {
                let mut fields = rest.splitn(3, '|');
                let (_, _, list) = (fields.next()?, fields.next()?, fields.next()?);
                let names = list
                    .split(',')
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .collect();
                Some(ServerLine::Users { names })
            }
            "ERR" => {
                let mut fields = rest.splitn(3, '|');
                let (_, who, code) = (fields.next()?, fields.next()?, fields.next()?);
                Some(ServerLine::Err {
                    who: who.to_string(),
                    code: ErrorCode::from_wire(code)?,
                })
            }
            "ACK" => {
                let mut fields = rest.splitn(4, '|');
                let (_, old, kind, new) =
                    (fields.next()?, fields.next()?, fields.next()?, fields.next()?);
                if kind != "NAME_CHANGED" {
                    return None;
                }
                Some(ServerLine::Ack {
                    old: old.to_string(),
                    new: new.to_string(),
                })
            }
            "RENAME" => {
                let (old, new) = rest.split_once('|')?;
                Some(ServerLine::Rename {
                    old: old.to_string(),
                    new: new.to_string(),
                })
            }
            "AVATAR" => {
                let (who, url) = rest.split_once('|')?;
                Some(ServerLine::Avatar {
                    who: who.to_string(),
                    url: url.to_string(),
                })
            }
            _ => None,
        }
    }
}

impl fmt::Display for ServerLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerLine::Msg {
                sender,
                target,
                id,
                content,
            } => write!(f, "MSG|{}|{}|{}|{}", sender, target, id, content),
            ServerLine::Users { names } => {
                write!(f, "USERS|{}|{}|{}", SYSTEM_SENDER, EVERYONE, names.join(","))
            }
            ServerLine::Err { who, code } => write!(f, "ERR|{}|{}|{}", SYSTEM_SENDER, who, code),
            ServerLine::Ack { old, new } => {
                write!(f, "ACK|{}|{}|NAME_CHANGED|{}", SYSTEM_SENDER, old, new)
            }
            ServerLine::Rename { old, new } => write!(f, "RENAME|{}|{}", old, new),
            ServerLine::Avatar { who, url } => write!(f, "AVATAR|{}|{}", who, url),
        }
    }
}
