//! Demo: a store round-trip, a blob fetch, and two replicas syncing
//!
//! Run with: cargo run --example demo_page

use std::sync::Arc;
use std::time::Duration;

use memsync_core::{create_store, BlobSource, MemoryBlobSource};
use memsync_transport::{Accepted, ChannelTransport, ConnectPeer, SessionConfig};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    println!("=== memsync demo ===\n");

    // Read, insert, read again
    let store = Arc::new(create_store());
    println!("Replica: {}", store.replica_id());

    let before = store.read("test").await;
    println!("1. read(\"test\")            -> {:?}", before);

    let stamp = store.insert("test", "present").await?;
    println!("2. insert(\"test\", \"present\") -> stamp {}", stamp);

    let after = store.read("test").await;
    println!(
        "3. read(\"test\")            -> {:?}",
        after.as_deref().map(String::from_utf8_lossy)
    );

    // Blobs come from an opaque source and never touch the store
    let blobs = MemoryBlobSource::new();
    blobs.put("flowers.jpg", vec![0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10]);
    let blob = blobs.fetch_blob("flowers.jpg").await?;
    println!("4. fetch_blob(\"flowers.jpg\") -> {} bytes", blob.len());
    match blobs.fetch_blob("missing.png").await {
        Ok(_) => println!("   unexpected blob"),
        Err(e) => println!("   fetch_blob(\"missing.png\") -> {}", e),
    }

    // A second replica joins over an in-memory link
    println!("\n--- Syncing with a second replica ---");
    let other = Arc::new(create_store());
    let (left, right) = ChannelTransport::pair("demo");
    let config = SessionConfig {
        sync_interval: Duration::from_millis(100),
        ..SessionConfig::default()
    };
    let ours = store.connect_peer(Accepted::new(left), config.clone());
    let theirs = other.connect_peer(Accepted::new(right), config);

    other.insert("greeting", "hello from the other side").await?;

    tokio::time::timeout(Duration::from_secs(5), async {
        while store.read("greeting").await.is_none() || other.read("test").await.is_none() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await?;

    println!(
        "5. other.read(\"test\")      -> {:?}",
        other.read("test").await.as_deref().map(String::from_utf8_lossy)
    );
    println!(
        "6. read(\"greeting\")        -> {:?}",
        store.read("greeting").await.as_deref().map(String::from_utf8_lossy)
    );

    // Delete on one side, watch it vanish on the other
    other.delete("test").await?;
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.read("test").await.is_some() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await?;
    println!("7. after other.delete(\"test\"): read(\"test\") -> {:?}", store.read("test").await);

    let summary = ours.summary();
    println!(
        "\nSession {} -> {:?}, {} rounds",
        summary.label, summary.state, summary.stats.rounds
    );

    ours.close().await?;
    theirs.join().await?;

    println!("\n=== Demo complete ===");
    Ok(())
}
