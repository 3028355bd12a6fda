//! Message codes and the parser that turns a [`Frame`] into a [`Message`].
//!
//! # Vocabulary
//!
//! ```text
//! C   identity announcement   C <id> <host> <database> <secure> <version>
//! A   presence join           A <id> [<host> <database>] <secure> [<version>]
//! R   presence rename         R <old> <new> ...join fields
//! L   presence leave          L <id>
//! M   chat line               M <id>: <text>
//! V   validation ack          V [<id>]
//! S   relay notice            S <relay>: <text>
//!
//! AL AD AE AT AC AQ ACl ASn AKG AK   insert    <id>[:<sort>] >|< <path...>
//! RN                                 rename    <Kind> >|< <path...> >|< <new>
//! DN                                 delete    <Kind> >|< <path...>
//! MV                                 move      <Kind> >|< <n> >|< <source...> >|< <dest parent...>
//! NA<p> NR<p> ND<p>                  note attach / rename / delete on parent kind <p>
//! ```
//!
//! Parsing is pure: it never touches the replica or the presence set.

use std::fmt;

use crate::error::SyncError;
use crate::frame::Frame;
use crate::path::{NodeKind, NodeList, NoteParent, TypedPath};

// ── MessageCode ──────────────────────────────────────────────────

/// Every type code understood by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCode {
    Announce,
    Join,
    RenameUser,
    Leave,
    Chat,
    Validate,
    Notice,
    Insert(NodeKind),
    Rename,
    Delete,
    Move,
    AttachNote(NoteParent),
    RenameNote(NoteParent),
    DeleteNote(NoteParent),
}

const INSERT_CODES: [(&str, NodeKind); 10] = [
    ("AL", NodeKind::Library),
    ("AD", NodeKind::Document),
    ("AE", NodeKind::Episode),
    ("AT", NodeKind::Transcript),
    ("AC", NodeKind::Collection),
    ("AQ", NodeKind::Quote),
    ("ACl", NodeKind::Clip),
    ("ASn", NodeKind::Snapshot),
    ("AKG", NodeKind::KeywordGroup),
    ("AK", NodeKind::Keyword),
];

impl TryFrom<&str> for MessageCode {
    type Error = SyncError;

    fn try_from(code: &str) -> Result<Self, Self::Error> {
        let simple = match code {
            "C" => Some(Self::Announce),
            "A" => Some(Self::Join),
            "R" => Some(Self::RenameUser),
            "L" => Some(Self::Leave),
            "M" => Some(Self::Chat),
            "V" => Some(Self::Validate),
            "S" => Some(Self::Notice),
            "RN" => Some(Self::Rename),
            "DN" => Some(Self::Delete),
            "MV" => Some(Self::Move),
            _ => None,
        };
        if let Some(simple) = simple {
            return Ok(simple);
        }
        if let Some((_, kind)) = INSERT_CODES.iter().find(|(c, _)| *c == code) {
            return Ok(Self::Insert(*kind));
        }

        let note = |prefix: &str| code.strip_prefix(prefix).and_then(NoteParent::from_suffix);
        if let Some(parent) = note("NA") {
            return Ok(Self::AttachNote(parent));
        }
        if let Some(parent) = note("NR") {
            return Ok(Self::RenameNote(parent));
        }
        if let Some(parent) = note("ND") {
            return Ok(Self::DeleteNote(parent));
        }
        Err(SyncError::UnknownCode(code.to_string()))
    }
}

impl fmt::Display for MessageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Announce => f.write_str("C"),
            Self::Join => f.write_str("A"),
            Self::RenameUser => f.write_str("R"),
            Self::Leave => f.write_str("L"),
            Self::Chat => f.write_str("M"),
            Self::Validate => f.write_str("V"),
            Self::Notice => f.write_str("S"),
            Self::Insert(kind) => {
                let code = INSERT_CODES
                    .iter()
                    .find(|(_, k)| k == kind)
                    .map(|(c, _)| *c)
                    .unwrap_or("A?");
                f.write_str(code)
            }
            Self::Rename => f.write_str("RN"),
            Self::Delete => f.write_str("DN"),
            Self::Move => f.write_str("MV"),
            Self::AttachNote(p) => write!(f, "NA{}", p.suffix()),
            Self::RenameNote(p) => write!(f, "NR{}", p.suffix()),
            Self::DeleteNote(p) => write!(f, "ND{}", p.suffix()),
        }
    }
}

// ── Presence payloads ────────────────────────────────────────────

/// A presence entry as carried by join and rename frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    pub identity: String,
    pub secure: bool,
}

/// The identity announcement a client sends right after connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub identity: String,
    pub host: String,
    pub database: String,
    pub secure: bool,
    pub protocol_version: u32,
}

fn parse_flag(field: &str) -> bool {
    field.eq_ignore_ascii_case("true") || field == "1"
}

fn encode_flag(secure: bool) -> &'static str {
    if secure { "True" } else { "False" }
}

/// Field-count rule: 5 fields carry the flag at index 3, 2 fields at
/// index 1, anything else is treated as not secure.
fn presence_from_fields(fields: &[&str]) -> Result<Presence, SyncError> {
    let identity = match fields.first() {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => return Err(SyncError::MalformedFrame("presence without identity".into())),
    };
    let secure = match fields.len() {
        5 => parse_flag(fields[3]),
        2 => parse_flag(fields[1]),
        _ => false,
    };
    Ok(Presence { identity, secure })
}

// ── Operation ────────────────────────────────────────────────────

/// A structural change to the shared catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Insert {
        path: TypedPath,
        id: i64,
        sort_key: Option<i64>,
    },
    Rename {
        path: TypedPath,
        new_name: String,
    },
    Delete {
        path: TypedPath,
    },
    Move {
        path: TypedPath,
        /// The new parent of the moved node.
        destination: TypedPath,
    },
    AttachNote {
        parent: NoteParent,
        path: TypedPath,
        id: i64,
    },
    RenameNote {
        parent: NoteParent,
        path: TypedPath,
        new_name: String,
    },
    DeleteNote {
        parent: NoteParent,
        path: TypedPath,
    },
}

impl Operation {
    /// The path of the node this operation targets.
    pub fn path(&self) -> &TypedPath {
        match self {
            Self::Insert { path, .. }
            | Self::Rename { path, .. }
            | Self::Delete { path }
            | Self::Move { path, .. }
            | Self::AttachNote { path, .. }
            | Self::RenameNote { path, .. }
            | Self::DeleteNote { path, .. } => path,
        }
    }

    fn target_kind(&self) -> NodeKind {
        self.path()
            .leaf()
            .map(|s| s.kind)
            .unwrap_or(NodeKind::Root)
    }

    pub fn code(&self) -> MessageCode {
        match self {
            Self::Insert { .. } => MessageCode::Insert(self.target_kind()),
            Self::Rename { .. } => MessageCode::Rename,
            Self::Delete { .. } => MessageCode::Delete,
            Self::Move { .. } => MessageCode::Move,
            Self::AttachNote { parent, .. } => MessageCode::AttachNote(*parent),
            Self::RenameNote { parent, .. } => MessageCode::RenameNote(*parent),
            Self::DeleteNote { parent, .. } => MessageCode::DeleteNote(*parent),
        }
    }

    /// The node-list payload in wire form.
    pub fn encode_payload(&self) -> String {
        let mut list = NodeList::default();
        let extend = |list: &mut NodeList, path: &TypedPath| {
            for segment in path.segments() {
                list.push(segment.name.clone());
            }
        };
        match self {
            Self::Insert { path, id, sort_key } => {
                list.push(encode_id(*id, *sort_key));
                extend(&mut list, path);
            }
            Self::Rename { path, new_name } => {
                list.push(self.target_kind().tag());
                extend(&mut list, path);
                list.push(new_name.clone());
            }
            Self::Delete { path } => {
                list.push(self.target_kind().tag());
                extend(&mut list, path);
            }
            Self::Move { path, destination } => {
                list.push(self.target_kind().tag());
                list.push(path.segments().len().to_string());
                extend(&mut list, path);
                extend(&mut list, destination);
            }
            Self::AttachNote { path, id, .. } => {
                list.push(id.to_string());
                extend(&mut list, path);
            }
            Self::RenameNote { path, new_name, .. } => {
                extend(&mut list, path);
                list.push(new_name.clone());
            }
            Self::DeleteNote { path, .. } => extend(&mut list, path),
        }
        list.encode()
    }
}

fn encode_id(id: i64, sort_key: Option<i64>) -> String {
    match sort_key {
        Some(sort) => format!("{id}:{sort}"),
        None => id.to_string(),
    }
}

fn parse_id(field: &str) -> Result<(i64, Option<i64>), SyncError> {
    let invalid = || SyncError::InvalidField {
        field: "record id",
        value: field.to_string(),
    };
    match field.split_once(':') {
        Some((id, sort)) => Ok((
            id.parse().map_err(|_| invalid())?,
            Some(sort.parse().map_err(|_| invalid())?),
        )),
        None => Ok((field.parse().map_err(|_| invalid())?, None)),
    }
}

fn require(code: MessageCode, list: &NodeList, min: usize, expected: &'static str) -> Result<(), SyncError> {
    if list.len() < min {
        return Err(SyncError::Arity {
            code: code.to_string(),
            expected,
            actual: list.len(),
        });
    }
    Ok(())
}

fn parse_operation(code: MessageCode, payload: &str) -> Result<Operation, SyncError> {
    let list = NodeList::parse(payload);
    let names = list.names();

    match code {
        MessageCode::Insert(kind) => {
            require(code, &list, 3, "at least 3")?;
            let (id, sort_key) = parse_id(&names[0])?;
            let path = kind.grammar()?.interpret(&names[1..])?;
            Ok(Operation::Insert { path, id, sort_key })
        }
        MessageCode::Rename => {
            require(code, &list, 4, "at least 4")?;
            let kind = NodeKind::try_from(names[0].as_str())?;
            let (new_name, old) = names[1..].split_last().ok_or(SyncError::Arity {
                code: code.to_string(),
                expected: "at least 4",
                actual: list.len(),
            })?;
            let path = kind.grammar()?.interpret(old)?;
            Ok(Operation::Rename {
                path,
                new_name: new_name.clone(),
            })
        }
        MessageCode::Delete => {
            require(code, &list, 3, "at least 3")?;
            let kind = NodeKind::try_from(names[0].as_str())?;
            let path = kind.grammar()?.interpret(&names[1..])?;
            Ok(Operation::Delete { path })
        }
        MessageCode::Move => {
            require(code, &list, 5, "at least 5")?;
            let kind = NodeKind::try_from(names[0].as_str())?;
            let source_len: usize = names[1].parse().map_err(|_| SyncError::InvalidField {
                field: "source length",
                value: names[1].clone(),
            })?;
            let rest = &names[2..];
            if source_len < 2 || source_len >= rest.len() {
                return Err(SyncError::InvalidField {
                    field: "source length",
                    value: names[1].clone(),
                });
            }
            let (source, destination) = rest.split_at(source_len);
            let grammar = kind.grammar()?;
            let path = grammar.interpret(source)?;

            // Type the destination by placing the moved leaf under it.
            let mut landed = destination.to_vec();
            landed.push(source[source.len() - 1].clone());
            let destination = grammar
                .interpret(&landed)?
                .parent()
                .ok_or_else(|| SyncError::MalformedFrame("move without destination".into()))?;
            Ok(Operation::Move { path, destination })
        }
        MessageCode::AttachNote(parent) => {
            require(code, &list, 4, "at least 4")?;
            let (id, _) = parse_id(&names[0])?;
            let path = parent.grammar().interpret(&names[1..])?;
            Ok(Operation::AttachNote { parent, path, id })
        }
        MessageCode::RenameNote(parent) => {
            require(code, &list, 4, "at least 4")?;
            let (new_name, old) = names.split_last().ok_or(SyncError::Arity {
                code: code.to_string(),
                expected: "at least 4",
                actual: list.len(),
            })?;
            let path = parent.grammar().interpret(old)?;
            Ok(Operation::RenameNote {
                parent,
                path,
                new_name: new_name.clone(),
            })
        }
        MessageCode::DeleteNote(parent) => {
            require(code, &list, 3, "at least 3")?;
            let path = parent.grammar().interpret(names)?;
            Ok(Operation::DeleteNote { parent, path })
        }
        other => Err(SyncError::MalformedFrame(format!(
            "{other} is not a structural code"
        ))),
    }
}

// ── Message ──────────────────────────────────────────────────────

/// A parsed frame, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Announce(Announcement),
    Join(Presence),
    /// The frame sender is the old identity.
    RenameUser {
        old: String,
        presence: Presence,
    },
    Leave {
        identity: String,
    },
    Chat {
        text: String,
    },
    Validated,
    Notice {
        text: String,
    },
    Structural(Operation),
}

impl Message {
    pub fn code(&self) -> MessageCode {
        match self {
            Self::Announce(_) => MessageCode::Announce,
            Self::Join(_) => MessageCode::Join,
            Self::RenameUser { .. } => MessageCode::RenameUser,
            Self::Leave { .. } => MessageCode::Leave,
            Self::Chat { .. } => MessageCode::Chat,
            Self::Validated => MessageCode::Validate,
            Self::Notice { .. } => MessageCode::Notice,
            Self::Structural(op) => op.code(),
        }
    }

    /// Wire text for this message sent by `identity`, without the frame
    /// terminator.
    pub fn encode(&self, identity: &str) -> String {
        match self {
            Self::Announce(a) => format!(
                "C {} {} {} {} {}",
                a.identity,
                a.host,
                a.database,
                encode_flag(a.secure),
                a.protocol_version
            ),
            Self::Join(p) => format!("A {} {}", p.identity, encode_flag(p.secure)),
            Self::RenameUser { old, presence } => format!(
                "R {old} {} {}",
                presence.identity,
                encode_flag(presence.secure)
            ),
            Self::Leave { identity } => format!("L {identity}"),
            Self::Chat { text } => format!("M {identity}: {text}"),
            Self::Validated => format!("V {identity}"),
            Self::Notice { text } => format!("S {identity}: {text}"),
            Self::Structural(op) => format!("{} {identity} {}", op.code(), op.encode_payload()),
        }
    }
}

/// Parse one frame.
///
/// Unknown codes yield [`SyncError::UnknownCode`]; every other error is a
/// malformed payload for a known code.
pub fn parse(frame: &Frame) -> Result<Message, SyncError> {
    let code = MessageCode::try_from(frame.code())?;
    let sender = frame.sender();
    let payload = frame.payload();

    match code {
        MessageCode::Announce => {
            let fields: Vec<&str> = std::iter::once(sender)
                .chain(payload.split_whitespace())
                .collect();
            if fields.len() != 5 {
                return Err(SyncError::Arity {
                    code: code.to_string(),
                    expected: "5",
                    actual: fields.len(),
                });
            }
            let protocol_version = fields[4].parse().map_err(|_| SyncError::InvalidField {
                field: "protocol version",
                value: fields[4].to_string(),
            })?;
            Ok(Message::Announce(Announcement {
                identity: fields[0].to_string(),
                host: fields[1].to_string(),
                database: fields[2].to_string(),
                secure: parse_flag(fields[3]),
                protocol_version,
            }))
        }
        MessageCode::Join => {
            let fields: Vec<&str> = std::iter::once(sender)
                .chain(payload.split_whitespace())
                .collect();
            Ok(Message::Join(presence_from_fields(&fields)?))
        }
        MessageCode::RenameUser => {
            if sender.is_empty() {
                return Err(SyncError::MalformedFrame("rename without identity".into()));
            }
            let fields: Vec<&str> = payload.split_whitespace().collect();
            Ok(Message::RenameUser {
                old: sender.to_string(),
                presence: presence_from_fields(&fields)?,
            })
        }
        MessageCode::Leave => {
            if sender.is_empty() {
                return Err(SyncError::MalformedFrame("leave without identity".into()));
            }
            Ok(Message::Leave {
                identity: sender.to_string(),
            })
        }
        MessageCode::Chat => Ok(Message::Chat {
            text: payload.to_string(),
        }),
        MessageCode::Validate => Ok(Message::Validated),
        MessageCode::Notice => Ok(Message::Notice {
            text: payload.to_string(),
        }),
        structural => parse_operation(structural, payload).map(Message::Structural),
    }
}

// ── Tests ────────────────────────────────────────────────────────
