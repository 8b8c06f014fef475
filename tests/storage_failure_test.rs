//! Storage fault behavior: failures are reported, never wedge the session

mod common;

use std::time::Duration;

use common::{reply_text, BotTest};
use tempfile::TempDir;

const USER: i64 = 55;

/// Build a bot whose store roots sit below a regular file, so every
/// directory creation fails
fn broken_bot(dir: &TempDir) -> BotTest {
    let blocker = dir.path().join("blocked");
    std::fs::write(&blocker, b"not a directory").expect("write blocker");
    BotTest::with_store_roots(
        blocker.join("generated"),
        blocker.join("uploaded"),
        Duration::ZERO,
    )
}

#[tokio::test]
async fn test_generate_storage_failure_is_reported() {
    let dir = TempDir::new().expect("tempdir");
    let bot = broken_bot(&dir);

    let reply = bot.text(USER, "a cat").await;

    assert!(reply_text(&reply).contains("went wrong"));
    assert_eq!(bot.generated_count(USER).await, 0);
}

#[tokio::test]
async fn test_upload_storage_failure_still_holds_pending() {
    let dir = TempDir::new().expect("tempdir");
    let bot = broken_bot(&dir);

    let reply = bot.image(USER, b"photo", None).await;

    // The persisted copy failed, but the in-memory one still drives the flow
    assert!(reply_text(&reply).contains("holding onto it"));
    assert!(bot.awaiting_prompt(USER).await);
    assert_eq!(bot.uploaded_count(USER).await, 0);
}

#[tokio::test]
async fn test_transform_storage_failure_advances_to_idle() {
    let dir = TempDir::new().expect("tempdir");
    let bot = broken_bot(&dir);

    bot.image(USER, b"photo", None).await;
    let reply = bot.text(USER, "make it night").await;

    assert!(reply_text(&reply).contains("went wrong"));
    // Unlike a provider failure, a broken disk must not trap the user in
    // a retry loop that can never succeed
    assert!(!bot.awaiting_prompt(USER).await);
}
