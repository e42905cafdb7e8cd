//! Checkpoint store contract tests, run against both backends.

use chrono::Utc;

use colloquy::checkpoint::{Checkpoint, Checkpointer, CheckpointerError, InMemoryCheckpointer};
use colloquy::message::Message;
use colloquy::state::ConversationState;

fn checkpoint(thread_id: &str, seq: u64, text: &str) -> Checkpoint {
    let mut state = ConversationState::new_with_user_message(text);
    state.push(Message::assistant(format!("re: {text}")));
    Checkpoint {
        thread_id: thread_id.to_string(),
        seq,
        state,
        created_at: Utc::now(),
    }
}

async fn roundtrip(store: &dyn Checkpointer) {
    assert!(store.load_latest("t1").await.unwrap().is_none());

    store.append(checkpoint("t1", 1, "first")).await.unwrap();
    store.append(checkpoint("t1", 2, "second")).await.unwrap();

    let latest = store.load_latest("t1").await.unwrap().unwrap();
    assert_eq!(latest.seq, 2);
    assert_eq!(latest.state.messages[0].content, "second");
    assert_eq!(latest.state.iteration_count, 0);
}

async fn thread_isolation(store: &dyn Checkpointer) {
    store.append(checkpoint("a", 1, "for a")).await.unwrap();
    store.append(checkpoint("b", 1, "for b")).await.unwrap();

    let a = store.load_latest("a").await.unwrap().unwrap();
    let b = store.load_latest("b").await.unwrap().unwrap();
    assert_eq!(a.state.messages[0].content, "for a");
    assert_eq!(b.state.messages[0].content, "for b");

    let mut threads = store.list_threads().await.unwrap();
    threads.sort();
    assert_eq!(threads, vec!["a", "b"]);
}

async fn delete_is_terminal(store: &dyn Checkpointer) {
    store.append(checkpoint("gone", 1, "doomed")).await.unwrap();
    store.delete_thread("gone").await.unwrap();
    assert!(store.load_latest("gone").await.unwrap().is_none());
    assert!(!store.list_threads().await.unwrap().contains(&"gone".to_string()));

    // Deleting an unknown thread is a no-op.
    store.delete_thread("never-existed").await.unwrap();
}

async fn duplicate_seq_conflicts(store: &dyn Checkpointer) {
    store.append(checkpoint("t1", 1, "original")).await.unwrap();
    let err = store
        .append(checkpoint("t1", 1, "usurper"))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckpointerError::Conflict { seq: 1, .. }));

    // The original write is untouched.
    let latest = store.load_latest("t1").await.unwrap().unwrap();
    assert_eq!(latest.state.messages[0].content, "original");

    // The same seq on another thread is fine.
    store.append(checkpoint("t2", 1, "elsewhere")).await.unwrap();
}

#[tokio::test]
async fn in_memory_roundtrip() {
    roundtrip(&InMemoryCheckpointer::new()).await;
}

#[tokio::test]
async fn in_memory_thread_isolation() {
    thread_isolation(&InMemoryCheckpointer::new()).await;
}

#[tokio::test]
async fn in_memory_delete() {
    delete_is_terminal(&InMemoryCheckpointer::new()).await;
}

#[tokio::test]
async fn in_memory_conflict() {
    duplicate_seq_conflicts(&InMemoryCheckpointer::new()).await;
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use colloquy::checkpoint::SqliteCheckpointer;

    async fn temp_store(dir: &tempfile::TempDir) -> SqliteCheckpointer {
        let path = dir.path().join("colloquy-test.db");
        let url = format!("sqlite://{}?mode=rwc", path.display());
        SqliteCheckpointer::connect(&url).await.unwrap()
    }

    #[tokio::test]
    async fn sqlite_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        roundtrip(&temp_store(&dir).await).await;
    }

    #[tokio::test]
    async fn sqlite_thread_isolation() {
        let dir = tempfile::tempdir().unwrap();
        thread_isolation(&temp_store(&dir).await).await;
    }

    #[tokio::test]
    async fn sqlite_delete() {
        let dir = tempfile::tempdir().unwrap();
        delete_is_terminal(&temp_store(&dir).await).await;
    }

    #[tokio::test]
    async fn sqlite_conflict() {
        let dir = tempfile::tempdir().unwrap();
        duplicate_seq_conflicts(&temp_store(&dir).await).await;
    }

    #[tokio::test]
    async fn sqlite_survives_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = temp_store(&dir).await;
            store.append(checkpoint("t1", 1, "durable")).await.unwrap();
        }
        let store = temp_store(&dir).await;
        let latest = store.load_latest("t1").await.unwrap().unwrap();
        assert_eq!(latest.state.messages[0].content, "durable");
    }

    #[tokio::test]
    async fn sqlite_history_is_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir).await;
        store.append(checkpoint("t1", 1, "one")).await.unwrap();
        store.append(checkpoint("t1", 2, "two")).await.unwrap();
        store.append(checkpoint("t1", 3, "three")).await.unwrap();

        let history = store.history("t1").await.unwrap();
        let seqs: Vec<u64> = history.iter().map(|c| c.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }
}
