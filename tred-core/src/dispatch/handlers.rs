use tred_store::Store;

use super::parse_opts::{parse_set_options, resolve_expire_at_unix_millis};
use crate::command::{CommandFrame, CommandReply};

pub(super) fn handle_ping(_store: &Store, _frame: &CommandFrame) -> CommandReply {
    CommandReply::SimpleString("PONG".to_owned())
}

/// Replies `OK`; the server closes the connection after writing the reply.
pub(super) fn handle_quit(_store: &Store, _frame: &CommandFrame) -> CommandReply {
    CommandReply::SimpleString("OK".to_owned())
}

pub(super) fn handle_echo(_store: &Store, frame: &CommandFrame) -> CommandReply {
    CommandReply::BulkString(frame.args[0].clone())
}

pub(super) fn handle_set(store: &Store, frame: &CommandFrame) -> CommandReply {
    let key = &frame.args[0];
    let value = &frame.args[1];
    let options = match parse_set_options(&frame.args[2..]) {
        Ok(options) => options,
        Err(error) => return CommandReply::Error(error),
    };
    let expire_at_unix_ms = options.expire.map(resolve_expire_at_unix_millis);

    match store.set(key, value, options.condition, expire_at_unix_ms) {
        Ok(()) => CommandReply::SimpleString("OK".to_owned()),
        Err(error) => CommandReply::Error(error.to_string()),
    }
}

pub(super) fn handle_get(store: &Store, frame: &CommandFrame) -> CommandReply {
    match store.get(&frame.args[0]) {
        Some(value) => CommandReply::BulkString(value),
        None => CommandReply::Null,
    }
}

pub(super) fn handle_del(store: &Store, frame: &CommandFrame) -> CommandReply {
    let mut deleted = 0_i64;

    for key in &frame.args {
        match store.delete(key) {
            Ok(true) => deleted = deleted.saturating_add(1),
            Ok(false) => {}
            Err(error) => return CommandReply::Error(error.to_string()),
        }
    }

    CommandReply::Integer(deleted)
}
