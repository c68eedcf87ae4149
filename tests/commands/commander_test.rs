//! Command behaviour against in-memory storage.

use std::sync::Arc;

use urlminder::commands::{
    CommandError, Commander, LIST_LIMIT, MSG_ALREADY_EXISTS, MSG_HELLO, MSG_HELP,
    MSG_NO_SAVED_PAGES, MSG_SAVED, MSG_UNKNOWN_COMMAND,
};
use urlminder::storage::{MemoryStorage, Page, Storage};

use crate::support::RecordingMessenger;

const CHAT: i64 = 77;

fn setup() -> (Commander, Arc<MemoryStorage>, RecordingMessenger) {
    let storage = Arc::new(MemoryStorage::new());
    let messenger = RecordingMessenger::new();
    let commander = Commander::new(
        Arc::clone(&storage) as Arc<dyn Storage>,
        Arc::new(messenger.clone()),
    );
    (commander, storage, messenger)
}

#[tokio::test]
async fn start_greets_and_explains() {
    let (commander, _, messenger) = setup();
    commander.handle("/start", CHAT, "alice").await.expect("start");

    let sent = messenger.texts();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].starts_with(MSG_HELLO));
    assert!(sent[0].ends_with(MSG_HELP));
}

#[tokio::test]
async fn help_and_unknown_replies() {
    let (commander, _, messenger) = setup();
    commander.handle("/help", CHAT, "alice").await.expect("help");
    commander.handle("what is this", CHAT, "alice").await.expect("unknown");
    commander.handle("/frobnicate", CHAT, "alice").await.expect("unknown");

    assert_eq!(
        messenger.texts(),
        vec![MSG_HELP, MSG_UNKNOWN_COMMAND, MSG_UNKNOWN_COMMAND]
    );
}

#[tokio::test]
async fn saving_twice_reports_existing_page() {
    let (commander, storage, messenger) = setup();
    commander
        .handle("https://example.com/article", CHAT, "alice")
        .await
        .expect("save");
    commander
        .handle("/add https://example.com/article", CHAT, "alice")
        .await
        .expect("save again");

    assert_eq!(messenger.texts(), vec![MSG_SAVED, MSG_ALREADY_EXISTS]);
    assert_eq!(storage.count().await.expect("count"), 1);
}

#[tokio::test]
async fn pages_are_per_user() {
    let (commander, _, messenger) = setup();
    commander
        .handle("https://example.com/mine", CHAT, "alice")
        .await
        .expect("save");
    commander.handle("/rnd", CHAT, "bob").await.expect("rnd");
    commander
        .handle("https://example.com/mine", CHAT, "bob")
        .await
        .expect("bob saves the same url");

    assert_eq!(
        messenger.texts(),
        vec![MSG_SAVED, MSG_NO_SAVED_PAGES, MSG_SAVED]
    );
}

#[tokio::test]
async fn random_sends_then_forgets_page() {
    let (commander, storage, messenger) = setup();
    storage
        .save(&Page::new("https://example.com/x", "alice"))
        .await
        .expect("seed");

    commander.handle("/rnd", CHAT, "alice").await.expect("rnd");
    commander.handle("/rnd", CHAT, "alice").await.expect("rnd");

    assert_eq!(
        messenger.texts(),
        vec!["https://example.com/x", MSG_NO_SAVED_PAGES]
    );
    assert_eq!(storage.count().await.expect("count"), 0);
}

#[tokio::test]
async fn failed_delivery_keeps_random_page() {
    let (commander, storage, messenger) = setup();
    storage
        .save(&Page::new("https://example.com/keep", "alice"))
        .await
        .expect("seed");
    messenger.set_failing(true);

    let err = commander
        .handle("/rnd", CHAT, "alice")
        .await
        .expect_err("send fails");
    assert!(matches!(err, CommandError::Reply(_)));
    assert_eq!(storage.count().await.expect("count"), 1);
}

#[tokio::test]
async fn list_shows_oldest_pages_up_to_limit() {
    let (commander, storage, messenger) = setup();
    commander.handle("/list", CHAT, "alice").await.expect("empty list");

    for i in 0..LIST_LIMIT.saturating_add(5) {
        storage
            .save(&Page::new(format!("https://example.com/{i}"), "alice"))
            .await
            .expect("seed");
    }
    commander.handle("/list", CHAT, "alice").await.expect("list");

    let sent = messenger.texts();
    assert_eq!(sent[0], MSG_NO_SAVED_PAGES);

    let lines: Vec<&str> = sent[1].lines().collect();
    assert_eq!(lines[0], format!("Saved pages ({LIST_LIMIT}):"));
    assert_eq!(lines.len(), LIST_LIMIT.saturating_add(1));
    assert_eq!(lines[1], "- https://example.com/0");
}

#[tokio::test]
async fn bot_mention_suffix_is_accepted() {
    let (commander, _, messenger) = setup();
    commander
        .handle("/help@urlminder_bot", CHAT, "alice")
        .await
        .expect("help");
    assert_eq!(messenger.sent(), vec![(CHAT, MSG_HELP.to_owned())]);
}
