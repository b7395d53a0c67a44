//! Restart and reload over the on-disk stores

use std::sync::Arc;

use tempfile::TempDir;

use entangle::{DurableStore, Engine, LineCol, MockHub, PeerConfig, RedbStore};

const ADDR_A: &str = "127.0.0.1:7001";
const ADDR_B: &str = "127.0.0.1:7002";

fn config() -> PeerConfig {
    PeerConfig::parse(&format!("{ADDR_A} S\n{ADDR_B} N\n")).unwrap()
}

async fn boot(dir: &TempDir) -> Engine {
    let config = config();
    let store = Arc::new(RedbStore::open(dir.path(), config.local_site()).unwrap());
    let hub = MockHub::new();
    let transport = hub.transport(config.local_peer().clone());
    let engine = Engine::new(config, store, transport);
    engine.open_document(None).await.unwrap();
    engine
}

#[tokio::test]
async fn restart_reconstructs_content_and_counters() {
    // S5: one hundred inserts survive a process restart exactly
    let dir = TempDir::new().unwrap();
    let text: String = (0..100).map(|i| char::from(b'a' + (i % 26) as u8)).collect();

    {
        let engine = boot(&dir).await;
        engine.insert_at(LineCol::new(0, 0), &text).await.unwrap();
        assert_eq!(engine.local_clock(), 100);
        engine.shutdown().await;
    }

    let engine = boot(&dir).await;
    assert_eq!(engine.content(), text);
    assert_eq!(engine.local_clock(), 100);
    engine.shutdown().await;
    drop(engine);

    // the restored id counter sits above every stored row
    let config = config();
    let store = RedbStore::open(dir.path(), config.local_site()).unwrap();
    let max_id = store
        .load_snapshot()
        .unwrap()
        .iter()
        .map(|r| r.id)
        .max()
        .unwrap();
    let rebuilt = entangle_core::TextBuffer::from_snapshot(
        config.local_site(),
        store.load_snapshot().unwrap(),
    )
    .unwrap();
    assert!(rebuilt.document().next_local_id() > max_id);
}

#[tokio::test]
async fn edits_after_restart_extend_the_log() {
    let dir = TempDir::new().unwrap();

    {
        let engine = boot(&dir).await;
        engine.insert_at(LineCol::new(0, 0), "ab").await.unwrap();
        engine.shutdown().await;
    }
    {
        let engine = boot(&dir).await;
        assert_eq!(engine.content(), "ab");
        engine.insert_at(LineCol::new(0, 2), "c").await.unwrap();
        assert_eq!(engine.local_clock(), 3);
        engine.shutdown().await;
    }

    let engine = boot(&dir).await;
    assert_eq!(engine.content(), "abc");
    engine.shutdown().await;
    drop(engine);

    let config = config();
    let store = RedbStore::open(dir.path(), config.local_site()).unwrap();
    let clocks: Vec<u64> = store
        .ops_range(1, 10)
        .unwrap()
        .iter()
        .map(|o| o.clock)
        .collect();
    assert_eq!(clocks, vec![1, 2, 3]);
}

#[tokio::test]
async fn deleted_rows_stay_deleted_across_restart() {
    let dir = TempDir::new().unwrap();

    {
        let engine = boot(&dir).await;
        engine.insert_at(LineCol::new(0, 0), "abc").await.unwrap();
        engine
            .delete_range(LineCol::new(0, 1), LineCol::new(0, 2))
            .await
            .unwrap();
        engine.shutdown().await;
    }

    let engine = boot(&dir).await;
    assert_eq!(engine.content(), "ac");
    engine.shutdown().await;
    drop(engine);

    // delete ops are in the log even though the rows are gone
    let config = config();
    let store = RedbStore::open(dir.path(), config.local_site()).unwrap();
    assert_eq!(store.ops_range(1, 10).unwrap().len(), 4);
}
