use std::thread;
use std::time::Duration;

use googletest::prelude::*;
use rstest::rstest;
use tempfile::TempDir;
use tred_store::store::now_unix_millis;
use tred_store::{SetCondition, Store};

use super::parse_opts::{SetExpire, parse_set_options, resolve_expire_at_unix_millis};
use super::registry::CommandRegistry;
use crate::command::{CommandFrame, CommandReply};

fn open_store(dir: &TempDir) -> Store {
    Store::open(&dir.path().join("dispatch.db")).expect("store should open")
}

fn frame(name: &str, args: &[&[u8]]) -> CommandFrame {
    CommandFrame::new(name, args.iter().map(|arg| arg.to_vec()).collect())
}

fn ok() -> CommandReply {
    CommandReply::SimpleString("OK".to_owned())
}

#[rstest]
fn dispatch_ping_replies_pong_for_any_arity() {
    let dir = TempDir::new().expect("temp dir");
    let store = open_store(&dir);
    let registry = CommandRegistry::with_builtin_commands();

    let bare = registry.dispatch(&store, &frame("PING", &[]));
    assert_that!(&bare, eq(&CommandReply::SimpleString("PONG".to_owned())));

    let with_args = registry.dispatch(&store, &frame("PING", &[b"hello", b"there"]));
    assert_that!(&with_args, eq(&CommandReply::SimpleString("PONG".to_owned())));
}

#[rstest]
fn dispatch_quit_replies_ok() {
    let dir = TempDir::new().expect("temp dir");
    let store = open_store(&dir);
    let registry = CommandRegistry::with_builtin_commands();

    let reply = registry.dispatch(&store, &frame("QUIT", &[]));
    assert_that!(&reply, eq(&ok()));
}

#[rstest]
fn dispatch_echo_returns_bulk_payload() {
    let dir = TempDir::new().expect("temp dir");
    let store = open_store(&dir);
    let registry = CommandRegistry::with_builtin_commands();

    let reply = registry.dispatch(&store, &frame("ECHO", &[b"payload"]));
    assert_that!(&reply, eq(&CommandReply::BulkString(b"payload".to_vec())));

    let missing = registry.dispatch(&store, &frame("ECHO", &[]));
    assert_that!(
        &missing,
        eq(&CommandReply::Error(
            "wrong number of arguments for 'ECHO' command".to_owned()
        ))
    );
}

#[rstest]
fn dispatch_set_then_get_round_trips() {
    let dir = TempDir::new().expect("temp dir");
    let store = open_store(&dir);
    let registry = CommandRegistry::with_builtin_commands();

    let set = registry.dispatch(&store, &frame("SET", &[b"foo", b"bar"]));
    assert_that!(&set, eq(&ok()));

    let get = registry.dispatch(&store, &frame("GET", &[b"foo"]));
    assert_that!(&get, eq(&CommandReply::BulkString(b"bar".to_vec())));

    let absent = registry.dispatch(&store, &frame("GET", &[b"missing"]));
    assert_that!(&absent, eq(&CommandReply::Null));
}

#[rstest]
fn dispatch_accepts_lowercase_command_names() {
    let dir = TempDir::new().expect("temp dir");
    let store = open_store(&dir);
    let registry = CommandRegistry::with_builtin_commands();

    let set = registry.dispatch(&store, &frame("set", &[b"k", b"v"]));
    assert_that!(&set, eq(&ok()));
    let get = registry.dispatch(&store, &frame("get", &[b"k"]));
    assert_that!(&get, eq(&CommandReply::BulkString(b"v".to_vec())));
}

#[rstest]
#[case::get_no_args("GET", &[] as &[&[u8]])]
#[case::get_extra_args("GET", &[b"k".as_slice(), b"extra".as_slice()])]
#[case::set_one_arg("SET", &[b"k".as_slice()])]
#[case::del_no_args("DEL", &[] as &[&[u8]])]
fn dispatch_rejects_bad_arity(#[case] name: &str, #[case] args: &[&[u8]]) {
    let dir = TempDir::new().expect("temp dir");
    let store = open_store(&dir);
    let registry = CommandRegistry::with_builtin_commands();

    let reply = registry.dispatch(&store, &frame(name, args));
    assert_that!(
        &reply,
        eq(&CommandReply::Error(format!(
            "wrong number of arguments for '{name}' command"
        )))
    );
}

#[rstest]
fn dispatch_rejects_unknown_commands() {
    let dir = TempDir::new().expect("temp dir");
    let store = open_store(&dir);
    let registry = CommandRegistry::with_builtin_commands();

    let reply = registry.dispatch(&store, &frame("FOOBAR", &[]));
    assert_that!(
        &reply,
        eq(&CommandReply::Error("unknown command 'FOOBAR'".to_owned()))
    );
}

#[rstest]
fn dispatch_set_nx_keeps_first_write() {
    let dir = TempDir::new().expect("temp dir");
    let store = open_store(&dir);
    let registry = CommandRegistry::with_builtin_commands();

    let first = registry.dispatch(&store, &frame("SET", &[b"k", b"a", b"NX"]));
    assert_that!(&first, eq(&ok()));
    let second = registry.dispatch(&store, &frame("SET", &[b"k", b"b", b"NX"]));
    // Condition misses still acknowledge with OK.
    assert_that!(&second, eq(&ok()));

    let get = registry.dispatch(&store, &frame("GET", &[b"k"]));
    assert_that!(&get, eq(&CommandReply::BulkString(b"a".to_vec())));
}

#[rstest]
fn dispatch_set_xx_requires_existing_key() {
    let dir = TempDir::new().expect("temp dir");
    let store = open_store(&dir);
    let registry = CommandRegistry::with_builtin_commands();

    let gated = registry.dispatch(&store, &frame("SET", &[b"k", b"a", b"XX"]));
    assert_that!(&gated, eq(&ok()));
    let absent = registry.dispatch(&store, &frame("GET", &[b"k"]));
    assert_that!(&absent, eq(&CommandReply::Null));

    let plain = registry.dispatch(&store, &frame("SET", &[b"k", b"a"]));
    assert_that!(&plain, eq(&ok()));
    let overwrite = registry.dispatch(&store, &frame("SET", &[b"k", b"b", b"XX"]));
    assert_that!(&overwrite, eq(&ok()));
    let get = registry.dispatch(&store, &frame("GET", &[b"k"]));
    assert_that!(&get, eq(&CommandReply::BulkString(b"b".to_vec())));
}

#[rstest]
fn dispatch_del_counts_removed_keys() {
    let dir = TempDir::new().expect("temp dir");
    let store = open_store(&dir);
    let registry = CommandRegistry::with_builtin_commands();

    let _ = registry.dispatch(&store, &frame("SET", &[b"a", b"1"]));
    let _ = registry.dispatch(&store, &frame("SET", &[b"b", b"2"]));

    let del = registry.dispatch(&store, &frame("DEL", &[b"a", b"b", b"c"]));
    assert_that!(&del, eq(&CommandReply::Integer(2)));

    let gone = registry.dispatch(&store, &frame("GET", &[b"a"]));
    assert_that!(&gone, eq(&CommandReply::Null));
}

#[rstest]
fn dispatch_set_px_expires_lazily() {
    let dir = TempDir::new().expect("temp dir");
    let store = open_store(&dir);
    let registry = CommandRegistry::with_builtin_commands();

    let set = registry.dispatch(&store, &frame("SET", &[b"k", b"v", b"PX", b"80"]));
    assert_that!(&set, eq(&ok()));
    let live = registry.dispatch(&store, &frame("GET", &[b"k"]));
    assert_that!(&live, eq(&CommandReply::BulkString(b"v".to_vec())));

    thread::sleep(Duration::from_millis(120));
    let expired = registry.dispatch(&store, &frame("GET", &[b"k"]));
    assert_that!(&expired, eq(&CommandReply::Null));
}

#[rstest]
fn dispatch_set_exat_in_the_past_expires_immediately() {
    let dir = TempDir::new().expect("temp dir");
    let store = open_store(&dir);
    let registry = CommandRegistry::with_builtin_commands();

    let set = registry.dispatch(&store, &frame("SET", &[b"k", b"v", b"EXAT", b"1"]));
    assert_that!(&set, eq(&ok()));
    let expired = registry.dispatch(&store, &frame("GET", &[b"k"]));
    assert_that!(&expired, eq(&CommandReply::Null));
}

#[rstest]
fn dispatch_set_with_bad_expire_argument_mutates_nothing() {
    let dir = TempDir::new().expect("temp dir");
    let store = open_store(&dir);
    let registry = CommandRegistry::with_builtin_commands();

    let reply = registry.dispatch(&store, &frame("SET", &[b"k", b"v", b"EX", b"soon"]));
    assert_that!(
        &reply,
        eq(&CommandReply::Error(
            "value is not an integer or out of range".to_owned()
        ))
    );
    let get = registry.dispatch(&store, &frame("GET", &[b"k"]));
    assert_that!(&get, eq(&CommandReply::Null));
}

#[rstest]
fn parse_set_options_reads_canonical_condition_then_expire() {
    let args = vec![b"NX".to_vec(), b"EX".to_vec(), b"5".to_vec()];
    let options = parse_set_options(&args).expect("canonical options should parse");
    assert_that!(options.condition, eq(SetCondition::IfMissing));
    assert_that!(&options.expire, eq(&Some(SetExpire::Seconds(5))));
}

#[rstest]
fn parse_set_options_rejects_nx_with_xx() {
    let args = vec![b"NX".to_vec(), b"XX".to_vec()];
    let error = parse_set_options(&args).expect_err("conflicting conditions must fail");
    assert_that!(
        error.as_str(),
        eq("NX and XX options at the same time are not compatible")
    );
}

#[rstest]
#[case::ex(b"EX".as_slice())]
#[case::px(b"PX".as_slice())]
#[case::exat(b"EXAT".as_slice())]
#[case::pxat(b"PXAT".as_slice())]
fn parse_set_options_requires_expire_argument(#[case] keyword: &[u8]) {
    let args = vec![keyword.to_vec()];
    let error = parse_set_options(&args).expect_err("bare expiration keyword must fail");
    assert_that!(error.contains("missing argument for"), eq(true));
}

#[rstest]
fn parse_set_options_skips_unrecognized_tokens() {
    let args = vec![b"KEEPTTL".to_vec(), b"nx".to_vec(), b"PX".to_vec(), b"700".to_vec()];
    let options = parse_set_options(&args).expect("unknown tokens are skipped");
    // Lowercase "nx" is not an option token and falls through with the rest.
    assert_that!(options.condition, eq(SetCondition::Always));
    assert_that!(&options.expire, eq(&Some(SetExpire::Milliseconds(700))));
}

#[rstest]
fn parse_set_options_lets_last_expiration_win() {
    let args = vec![
        b"EX".to_vec(),
        b"5".to_vec(),
        b"PX".to_vec(),
        b"900".to_vec(),
    ];
    let options = parse_set_options(&args).expect("repeated expirations should parse");
    assert_that!(&options.expire, eq(&Some(SetExpire::Milliseconds(900))));
}

#[rstest]
fn resolve_expire_pxat_truncates_to_whole_seconds() {
    assert_that!(
        resolve_expire_at_unix_millis(SetExpire::AtMilliseconds(5_000_500)),
        eq(5_000_000_u64)
    );
    assert_that!(
        resolve_expire_at_unix_millis(SetExpire::AtSeconds(7)),
        eq(7_000_u64)
    );
}

#[rstest]
fn resolve_expire_relative_deadlines_land_in_the_future() {
    let before = now_unix_millis();
    let deadline = resolve_expire_at_unix_millis(SetExpire::Seconds(10));
    assert_that!(deadline >= before + 10_000, eq(true));

    let px_deadline = resolve_expire_at_unix_millis(SetExpire::Milliseconds(250));
    assert_that!(px_deadline >= before + 250, eq(true));
}
