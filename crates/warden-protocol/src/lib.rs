#![forbid(unsafe_code)]

mod tokens;

use serde::{Deserialize, Serialize};
use warden_core::{PermissionName, PrincipalKind};

use tokens::{tokenize, Token};

/// Maximum accepted administrative command length.
pub const MAX_COMMAND_BYTES: usize = 512;

/// How an administrative command names a principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum Lookup {
    /// The invoker, the invocation channel, or the invocation channel's guild.
    This,
    /// A platform id or a case-insensitive name.
    Key(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PrincipalRef {
    User { lookup: Lookup },
    Channel { lookup: Lookup },
    Guild { lookup: Lookup },
    Role { role: String, guild: Option<Lookup> },
}

impl PrincipalRef {
    #[must_use]
    pub const fn kind(&self) -> PrincipalKind {
        match self {
            Self::User { .. } => PrincipalKind::User,
            Self::Channel { .. } => PrincipalKind::Channel,
            Self::Guild { .. } => PrincipalKind::Guild,
            Self::Role { .. } => PrincipalKind::Role,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionAction {
    Grant,
    Deny,
    Reset,
}

impl PermissionAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Grant => "grant",
            Self::Deny => "deny",
            Self::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdminCommand {
    Mutate {
        op: PermissionAction,
        permission: PermissionName,
        target: PrincipalRef,
    },
    List {
        filter: String,
    },
    Explain {
        permission: PermissionName,
        user: Option<Lookup>,
    },
    Evict,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("command is empty")]
    Empty,
    #[error("command exceeds max size: max={max} bytes actual={actual} bytes")]
    OversizedCommand { max: usize, actual: usize },
    #[error("unterminated quote")]
    UnterminatedQuote,
    #[error("unknown action `{0}`")]
    UnknownAction(String),
    #[error("missing {0}")]
    MissingArgument(&'static str),
    #[error("unexpected argument `{0}`")]
    UnexpectedArgument(String),
    #[error("unknown principal kind `{0}`; expected user, role, channel or guild")]
    UnknownPrincipalKind(String),
    #[error("invalid permission name")]
    InvalidPermissionName,
}

/// Parse an administrative command line such as `grant command.master user this`.
///
/// # Errors
/// Returns [`ProtocolError`] if the line is empty, oversized, has an unbalanced
/// quote, names an unknown action or principal kind, or is missing arguments.
pub fn parse_admin_command(input: &str) -> Result<AdminCommand, ProtocolError> {
    if input.len() > MAX_COMMAND_BYTES {
        return Err(ProtocolError::OversizedCommand {
            max: MAX_COMMAND_BYTES,
            actual: input.len(),
        });
    }
    let tokens = tokenize(input)?;
    let mut args = tokens.into_iter();
    let action = args.next().ok_or(ProtocolError::Empty)?.text;

    let command = match action.to_ascii_lowercase().as_str() {
        "grant" => parse_mutation(PermissionAction::Grant, &mut args)?,
        "deny" => parse_mutation(PermissionAction::Deny, &mut args)?,
        "reset" => parse_mutation(PermissionAction::Reset, &mut args)?,
        "list" => AdminCommand::List {
            filter: args
                .next()
                .map(|token| token.text.to_ascii_lowercase())
                .unwrap_or_default(),
        },
        "explain" => AdminCommand::Explain {
            permission: parse_permission(&mut args)?,
            user: args.next().map(into_lookup),
        },
        "evict" => AdminCommand::Evict,
        _ => return Err(ProtocolError::UnknownAction(action)),
    };

    if let Some(extra) = args.next() {
        return Err(ProtocolError::UnexpectedArgument(extra.text));
    }
    Ok(command)
}

fn parse_mutation(
    op: PermissionAction,
    args: &mut impl Iterator<Item = Token>,
) -> Result<AdminCommand, ProtocolError> {
    let permission = parse_permission(args)?;
    let target = parse_target(args)?;
    Ok(AdminCommand::Mutate {
        op,
        permission,
        target,
    })
}

fn parse_permission(
    args: &mut impl Iterator<Item = Token>,
) -> Result<PermissionName, ProtocolError> {
    let raw = args
        .next()
        .ok_or(ProtocolError::MissingArgument("permission name"))?
        .text;
    PermissionName::try_from(raw.to_ascii_lowercase())
        .map_err(|_| ProtocolError::InvalidPermissionName)
}

fn parse_target(args: &mut impl Iterator<Item = Token>) -> Result<PrincipalRef, ProtocolError> {
    let kind = args
        .next()
        .ok_or(ProtocolError::MissingArgument("principal kind"))?
        .text;
    let kind = PrincipalKind::try_from(kind.to_ascii_lowercase().as_str())
        .map_err(|_| ProtocolError::UnknownPrincipalKind(kind))?;
    let key = args
        .next()
        .ok_or(ProtocolError::MissingArgument("principal name or id"))?;

    Ok(match kind {
        PrincipalKind::User => PrincipalRef::User {
            lookup: into_lookup(key),
        },
        PrincipalKind::Channel => PrincipalRef::Channel {
            lookup: into_lookup(key),
        },
        PrincipalKind::Guild => PrincipalRef::Guild {
            lookup: into_lookup(key),
        },
        PrincipalKind::Role => {
            let guild = match args.next() {
                Some(word) if word.is_keyword("in") => Some(into_lookup(
                    args.next()
                        .ok_or(ProtocolError::MissingArgument("guild name or id"))?,
                )),
                Some(other) => return Err(ProtocolError::UnexpectedArgument(other.text)),
                None => None,
            };
            PrincipalRef::Role {
                role: key.text,
                guild,
            }
        }
    })
}

/// A bare `this` names the invocation context; `"this"` in quotes is a literal name.
fn into_lookup(key: Token) -> Lookup {
    if key.is_keyword("this") {
        Lookup::This
    } else {
        Lookup::Key(key.text)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        parse_admin_command, AdminCommand, Lookup, PermissionAction, PrincipalRef, ProtocolError,
        MAX_COMMAND_BYTES,
    };
    use warden_core::PrincipalKind;

    fn mutation(input: &str) -> (PermissionAction, String, PrincipalRef) {
        match parse_admin_command(input).unwrap() {
            AdminCommand::Mutate {
                op,
                permission,
                target,
            } => (op, permission.as_str().to_owned(), target),
            other => panic!("expected mutation, got {other:?}"),
        }
    }

    #[test]
    fn parses_grant_for_self() {
        let (op, permission, target) = mutation("grant command.master user this");
        assert_eq!(op, PermissionAction::Grant);
        assert_eq!(permission, "command.master");
        assert_eq!(
            target,
            PrincipalRef::User {
                lookup: Lookup::This
            }
        );
    }

    #[test]
    fn quoted_this_is_a_literal_name() {
        let (_, _, target) = mutation(r#"grant command.master user "this""#);
        assert_eq!(
            target,
            PrincipalRef::User {
                lookup: Lookup::Key(String::from("this"))
            }
        );

        let (_, _, target) = mutation(r#"deny command.master role "this" in "This""#);
        assert_eq!(
            target,
            PrincipalRef::Role {
                role: String::from("this"),
                guild: Some(Lookup::Key(String::from("This"))),
            }
        );

        let (_, _, target) = mutation("reset command.master guild THIS");
        assert_eq!(
            target,
            PrincipalRef::Guild {
                lookup: Lookup::This
            }
        );
    }

    #[test]
    fn parses_role_with_quoted_name_and_guild_qualifier() {
        let (op, _, target) = mutation(r#"DENY command.support role "League Helper" in 4411"#);
        assert_eq!(op, PermissionAction::Deny);
        assert_eq!(target.kind(), PrincipalKind::Role);
        assert_eq!(
            target,
            PrincipalRef::Role {
                role: String::from("League Helper"),
                guild: Some(Lookup::Key(String::from("4411"))),
            }
        );

        let (_, _, target) = mutation("reset support.publish role Helper");
        assert_eq!(
            target,
            PrincipalRef::Role {
                role: String::from("Helper"),
                guild: None,
            }
        );
    }

    #[test]
    fn parses_list_explain_and_evict() {
        assert_eq!(
            parse_admin_command("list command").unwrap(),
            AdminCommand::List {
                filter: String::from("command"),
            }
        );
        assert_eq!(
            parse_admin_command("list").unwrap(),
            AdminCommand::List {
                filter: String::new(),
            }
        );
        assert_eq!(
            parse_admin_command("LIST Command.Master").unwrap(),
            AdminCommand::List {
                filter: String::from("command.master"),
            }
        );
        assert_eq!(parse_admin_command("  evict  ").unwrap(), AdminCommand::Evict);
        match parse_admin_command("explain command.files alice").unwrap() {
            AdminCommand::Explain { permission, user } => {
                assert_eq!(permission.as_str(), "command.files");
                assert_eq!(user, Some(Lookup::Key(String::from("alice"))));
            }
            other => panic!("expected explain, got {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_commands() {
        assert_eq!(parse_admin_command("   ").unwrap_err(), ProtocolError::Empty);
        assert_eq!(
            parse_admin_command("promote command.master user this").unwrap_err(),
            ProtocolError::UnknownAction(String::from("promote"))
        );
        assert_eq!(
            parse_admin_command("grant command.master").unwrap_err(),
            ProtocolError::MissingArgument("principal kind")
        );
        assert_eq!(
            parse_admin_command("grant command.master member bob").unwrap_err(),
            ProtocolError::UnknownPrincipalKind(String::from("member"))
        );
        assert_eq!(
            parse_admin_command("grant command..master user this").unwrap_err(),
            ProtocolError::InvalidPermissionName
        );
        assert_eq!(
            parse_admin_command("grant command.master role Helper at 1").unwrap_err(),
            ProtocolError::UnexpectedArgument(String::from("at"))
        );
        assert_eq!(
            parse_admin_command("evict now").unwrap_err(),
            ProtocolError::UnexpectedArgument(String::from("now"))
        );
        assert_eq!(
            parse_admin_command("grant command.master user \"bob").unwrap_err(),
            ProtocolError::UnterminatedQuote
        );
        let long = format!("list {}", "x".repeat(MAX_COMMAND_BYTES));
        assert!(matches!(
            parse_admin_command(&long).unwrap_err(),
            ProtocolError::OversizedCommand { .. }
        ));
    }

    #[test]
    fn commands_serialize_with_tagged_shape() {
        let command = parse_admin_command("grant support.publish channel this").unwrap();
        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json["action"], "mutate");
        assert_eq!(json["op"], "grant");
        assert_eq!(json["target"]["kind"], "channel");
        assert_eq!(json["target"]["lookup"]["by"], "this");
    }
}
