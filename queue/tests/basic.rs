use std::time::Duration;

use relay_queue::{DurableQueue, MemoryQueue};

fn setup_tracing() {
    use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "relay_queue=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[tokio::test]
async fn test_push_receive_delete_cycle() {
    setup_tracing();
    let queue: MemoryQueue<String> = MemoryQueue::new();

    let id = queue.push("hello".to_string()).await.unwrap();
    assert_eq!(queue.len().await.unwrap(), 1);

    let delivery = queue
        .receive(Duration::from_secs(30))
        .await
        .unwrap()
        .expect("message should be available");
    assert_eq!(delivery.receipt_id, id);
    assert_eq!(delivery.body, "hello");

    // Leased messages still count towards depth until acknowledged.
    assert_eq!(queue.len().await.unwrap(), 1);

    assert!(queue.delete(&delivery.receipt_id).await.unwrap());
    assert_eq!(queue.len().await.unwrap(), 0);

    // Double-ack is not an error, just a no-op.
    assert!(!queue.delete(&delivery.receipt_id).await.unwrap());
}

#[tokio::test]
async fn test_receive_empty_queue_returns_none() {
    let queue: MemoryQueue<u64> = MemoryQueue::new();
    assert!(queue.receive(Duration::from_secs(1)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_receive_many_drains_up_to_max() {
    let queue: MemoryQueue<u64> = MemoryQueue::new();
    for i in 0..5 {
        queue.push(i).await.unwrap();
    }

    let batch = queue
        .receive_many(3, Duration::from_millis(10), Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(batch.len(), 3);
    assert_eq!(
        batch.iter().map(|d| d.body).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );

    let rest = queue
        .receive_many(3, Duration::from_millis(10), Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(rest.len(), 2);
}

#[tokio::test]
async fn test_receive_many_wakes_on_push() {
    let queue = std::sync::Arc::new(MemoryQueue::<u64>::new());

    let consumer = {
        let queue = queue.clone();
        tokio::spawn(async move {
            queue
                .receive_many(2, Duration::from_secs(5), Duration::from_secs(30))
                .await
                .unwrap()
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    queue.push(42).await.unwrap();

    let batch = consumer.await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].body, 42);
}

#[tokio::test]
async fn test_receive_many_times_out_empty() {
    let queue: MemoryQueue<u64> = MemoryQueue::new();
    let start = std::time::Instant::now();
    let batch = queue
        .receive_many(4, Duration::from_millis(50), Duration::from_secs(30))
        .await
        .unwrap();
    assert!(batch.is_empty());
    assert!(start.elapsed() >= Duration::from_millis(50));
}
