use super::*;
use crate::metainfo::{InfoHash, TorrentMeta};

fn meta() -> TorrentMeta {
    TorrentMeta::new(InfoHash([3u8; 20]), 16, 16, vec![[0u8; 20]]).unwrap()
}

#[test]
fn test_static_tracker_parse() {
    let tracker = StaticTracker::parse(["127.0.0.1:6881", "[::1]:6882"]).unwrap();
    assert_eq!(tracker.peers().len(), 2);
    assert_eq!(tracker.peers()[1].port(), 6882);
}

#[test]
fn test_static_tracker_parse_invalid() {
    let result = StaticTracker::parse(["127.0.0.1"]);
    assert!(matches!(result, Err(TrackerError::InvalidAddress(s)) if s == "127.0.0.1"));
}

#[tokio::test]
async fn test_static_tracker_get_peers() {
    let tracker = StaticTracker::parse(["10.0.0.1:1000", "10.0.0.2:2000"]).unwrap();
    let peers = tracker.get_peers(&meta()).await.unwrap();
    assert_eq!(peers, tracker.peers());
}

#[tokio::test]
async fn test_tracker_as_trait_object() {
    let tracker: Box<dyn Tracker> = Box::new(StaticTracker::default());
    assert!(tracker.get_peers(&meta()).await.unwrap().is_empty());
}
