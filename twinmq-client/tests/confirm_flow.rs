//! Client crate integration test: broker confirms settle the ledger through the listener

mod common;

use anyhow::Result;
use common::{cluster_config, Fixture};
use twinmq_client::{ClusterRole, ConfirmListener, PublisherOptions};

#[tokio::test]
async fn single_ack_settles_one_message() -> Result<()> {
    let fixture = Fixture::new();
    let publisher = fixture
        .publisher(cluster_config(true, false), PublisherOptions::default())
        .await?;

    for i in 1..=3 {
        publisher
            .publish(format!("body-{}", i), format!("c{}", i), format!("m{}", i))
            .await?;
    }

    fixture.provider.ack(ClusterRole::Primary, 2, false);

    assert_eq!(fixture.listener.acked_sequences(), vec![2]);
    assert_eq!(fixture.ledger.sequences(ClusterRole::Primary), vec![1, 3]);
    let acked = fixture.listener.acked.lock().unwrap();
    assert_eq!(acked[0].1.message_id, "m2");

    Ok(())
}

#[tokio::test]
async fn multiple_ack_settles_range() -> Result<()> {
    let fixture = Fixture::new();
    let publisher = fixture
        .publisher(cluster_config(true, false), PublisherOptions::default())
        .await?;

    for i in 1..=3 {
        publisher
            .publish(format!("body-{}", i), format!("c{}", i), format!("m{}", i))
            .await?;
    }

    fixture.provider.ack(ClusterRole::Primary, 2, true);

    assert_eq!(fixture.listener.acked_sequences(), vec![1, 2]);
    assert_eq!(fixture.ledger.sequences(ClusterRole::Primary), vec![3]);

    Ok(())
}

#[tokio::test]
async fn nack_hands_back_rejected_messages() -> Result<()> {
    let fixture = Fixture::new();
    let publisher = fixture
        .publisher(cluster_config(false, true), PublisherOptions::default())
        .await?;

    publisher.publish("a", "c1", "m1").await?;
    publisher.publish("b", "c2", "m2").await?;

    fixture.provider.nack(ClusterRole::Secondary, 2, true);

    let nacked = fixture.listener.nacked.lock().unwrap();
    assert_eq!(nacked.len(), 2);
    assert_eq!(nacked[0].1.body, b"a".to_vec());
    assert_eq!(nacked[1].1.role, ClusterRole::Secondary);
    assert!(fixture.ledger.is_empty());

    Ok(())
}

#[tokio::test]
async fn late_and_duplicate_confirms_are_ignored() -> Result<()> {
    let fixture = Fixture::new();
    let publisher = fixture
        .publisher(cluster_config(true, false), PublisherOptions::default())
        .await?;

    publisher.publish("a", "c1", "m1").await?;
    publisher.publish("b", "c2", "m2").await?;

    fixture.provider.ack(ClusterRole::Primary, 1, false);
    fixture.provider.ack(ClusterRole::Primary, 1, false);
    fixture.provider.ack(ClusterRole::Primary, 1, true);
    fixture.provider.ack(ClusterRole::Primary, 42, false);

    assert_eq!(fixture.listener.acked_sequences(), vec![1]);
    assert_eq!(fixture.ledger.sequences(ClusterRole::Primary), vec![2]);

    // publishing keeps working after bogus confirms
    let receipt = publisher.publish("c", "c3", "m3").await?;
    assert_eq!(receipt.sequence, 3);

    Ok(())
}

#[tokio::test]
async fn publisher_exposes_shared_ledger_and_listener() -> Result<()> {
    let fixture = Fixture::new();
    let publisher = fixture
        .publisher(cluster_config(true, false), PublisherOptions::default())
        .await?;

    publisher.publish("a", "c1", "m1").await?;

    assert_eq!(publisher.ledger().len(), fixture.ledger.len());
    assert!(std::sync::Arc::ptr_eq(&publisher.ledger(), &fixture.ledger));

    // acks delivered straight to the exposed listener settle the same ledger
    publisher
        .confirm_listener()
        .handle_ack(ClusterRole::Primary, 1, false);
    assert!(publisher.ledger().is_empty());
    assert_eq!(publisher.app_id(), "trading");

    Ok(())
}

#[tokio::test]
async fn confirms_settle_only_their_own_cluster() -> Result<()> {
    let active = Fixture::new();
    let standby = Fixture::with_provider(active.provider.clone());
    let primary_publisher = active
        .publisher(cluster_config(true, false), PublisherOptions::default())
        .await?;
    let secondary_publisher = standby
        .publisher(cluster_config(false, true), PublisherOptions::default())
        .await?;

    // both channels start their sequences at 1
    let first = primary_publisher.publish("a", "c1", "m1").await?;
    let second = secondary_publisher.publish("b", "c2", "m2").await?;
    assert_eq!((first.role, first.sequence), (ClusterRole::Primary, 1));
    assert_eq!((second.role, second.sequence), (ClusterRole::Secondary, 1));

    active.provider.ack(ClusterRole::Secondary, 1, false);

    assert!(active.listener.acked_sequences().is_empty());
    assert_eq!(active.ledger.sequences(ClusterRole::Primary), vec![1]);
    assert!(standby.ledger.is_empty());
    let acked = standby.listener.acked.lock().unwrap();
    assert_eq!(acked.len(), 1);
    assert_eq!(acked[0].1.message_id, "m2");
    assert_eq!(acked[0].1.role, ClusterRole::Secondary);

    Ok(())
}

#[tokio::test]
async fn one_ledger_tracks_both_channels() -> Result<()> {
    let fixture = Fixture::new();
    let publisher = fixture
        .publisher(cluster_config(true, true), PublisherOptions::default())
        .await?;

    // both channels hand out sequence 1 first
    let mut sequences = Vec::new();
    for role in ClusterRole::ALL {
        let channel = publisher.channel(role).await?;
        sequences.push(channel.next_publish_seq_no());
    }
    assert_eq!(sequences, vec![1, 1]);

    publisher.publish("a", "c1", "m1").await?;
    fixture.provider.nack(ClusterRole::Secondary, 1, true);

    assert!(fixture.listener.nacked_sequences().is_empty());
    assert_eq!(fixture.ledger.outstanding(ClusterRole::Primary), 1);

    fixture.provider.ack(ClusterRole::Primary, 1, true);
    assert_eq!(fixture.listener.acked_sequences(), vec![1]);
    assert!(fixture.ledger.is_empty());

    Ok(())
}
