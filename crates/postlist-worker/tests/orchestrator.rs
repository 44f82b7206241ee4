//! End-to-end orchestrator scenarios over fake collaborators.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use common::{collect_events, progress_values, FakeClassifier, HarnessBuilder, PostKind};
use postlist_models::{ProcessingStage, ProgressEvent, SessionId};
use postlist_worker::{RunOutcome, WorkerError};

const POST: &str = "https://www.instagram.com/p/Cx1Ab2Cd3Ef/";
const OTHER_POST: &str = "https://www.instagram.com/reel/Dy9Zz8Yy7Xx/";

fn result_document(events: &[ProgressEvent]) -> &postlist_models::ResultDocument {
    match events.last() {
        Some(ProgressEvent::Result { document }) => document,
        other => panic!("expected a final result event, got {:?}", other),
    }
}

fn image_names(document: &postlist_models::ResultDocument) -> Vec<String> {
    document
        .images
        .iter()
        .map(|r| r.rsplit('/').next().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_image_post_completes() {
    let harness = HarnessBuilder::new(PostKind::Images(3)).build().await;
    let session = SessionId::new();

    let mut handle = harness.orchestrator.start(&session, POST).await.unwrap();
    assert!(!handle.replayed);
    let events = collect_events(&mut handle.events).await;
    let outcome = handle.task.take().unwrap().await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));

    // Frame stages are skipped for image posts
    assert_eq!(progress_values(&events), vec![20, 95, 98]);

    let document = result_document(&events);
    assert_eq!(document.request_id, handle.request_id);
    assert_eq!(document.listing.name, "Ceramic Mug");
    assert_eq!(
        image_names(document),
        vec!["00_image_01.jpg", "01_image_02.jpg", "02_image_03.jpg"]
    );
    assert_eq!(
        document.images[0],
        format!("/image/{}/00_image_01.jpg", handle.request_id)
    );

    let dir = harness.orchestrator.cache().request_dir(&handle.request_id).unwrap();
    assert!(dir.result_file().is_file());
    assert!(dir.caption_file().is_file());
    assert_eq!(
        harness.generator.seen_images.lock().unwrap().len(),
        3,
        "generator sees the published images"
    );

    let status = harness.orchestrator.poll(&handle.request_id).await.unwrap();
    assert_eq!(status.stage, ProcessingStage::Completed);
    assert_eq!(status.progress, 100);
    assert_eq!(status.result.as_ref(), Some(document));

    let entry = harness
        .orchestrator
        .cache()
        .entry(&handle.source)
        .await
        .unwrap();
    assert_eq!(entry.request_id, handle.request_id);
}

#[tokio::test]
async fn test_video_post_selects_spaced_frames() {
    let harness = HarnessBuilder::new(PostKind::Video).build().await;
    let session = SessionId::new();

    let mut handle = harness.orchestrator.start(&session, POST).await.unwrap();
    let events = collect_events(&mut handle.events).await;
    handle.task.take().unwrap().await.unwrap();

    assert_eq!(progress_values(&events), vec![20, 40, 60, 80, 95, 98]);
    assert_eq!(harness.classifier.calls.load(Ordering::SeqCst), 50);

    // Frames every 10 indices, earlier scores higher: every 60th wins
    let document = result_document(&events);
    let names = image_names(document);
    assert_eq!(names.len(), 9);
    assert_eq!(names[0], "00_frame_000000.jpg");
    assert_eq!(names[1], "01_frame_000060.jpg");
    assert_eq!(names[8], "08_frame_000480.jpg");

    let dir = harness.orchestrator.cache().request_dir(&handle.request_id).unwrap();
    assert!(dir.frames_manifest().is_file());
    assert!(dir.relevant_dir().join("frame_000010.jpg").is_file());
    assert_eq!(
        std::fs::read_to_string(dir.transcript_file()).unwrap(),
        "It holds 350 ml"
    );
    assert_eq!(document.listing.description, "2 / It holds 350 ml");

    let manifest: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.frames_manifest()).unwrap()).unwrap();
    assert_eq!(manifest["sampled"], 50);
    assert_eq!(manifest["unscored"], 0);
    assert_eq!(manifest["selected"][1], 60);
}

#[tokio::test]
async fn test_unscorable_frame_is_excluded() {
    let harness = HarnessBuilder::new(PostKind::Video)
        .classifier(FakeClassifier::failing_on(&[0]))
        .build()
        .await;
    let session = SessionId::new();

    let mut handle = harness.orchestrator.start(&session, POST).await.unwrap();
    let events = collect_events(&mut handle.events).await;
    handle.task.take().unwrap().await.unwrap();

    let names = image_names(result_document(&events));
    assert_eq!(names[0], "00_frame_000010.jpg");
    assert_eq!(names.last().unwrap(), "08_frame_000490.jpg");

    let dir = harness.orchestrator.cache().request_dir(&handle.request_id).unwrap();
    let manifest: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.frames_manifest()).unwrap()).unwrap();
    assert_eq!(manifest["unscored"], 1);
    assert_eq!(manifest["frames"].as_array().unwrap().len(), 49);
}

#[tokio::test]
async fn test_transcription_and_generation_failures_degrade() {
    let harness = HarnessBuilder::new(PostKind::Video)
        .transcript(Err("audio track missing".to_string()))
        .generator_fails()
        .build()
        .await;
    let session = SessionId::new();

    let mut handle = harness.orchestrator.start(&session, POST).await.unwrap();
    let events = collect_events(&mut handle.events).await;
    handle.task.take().unwrap().await.unwrap();

    assert!(!events.iter().any(|e| matches!(e, ProgressEvent::Error { .. })));
    let document = result_document(&events);
    assert_eq!(document.listing.name, "Handmade ceramic mug");
    assert_eq!(document.listing.keywords, vec!["ceramics", "mug"]);
    assert!(document.listing.description.contains("Glazed by hand"));
    assert_eq!(harness.generator.calls.load(Ordering::SeqCst), 1);

    let dir = harness.orchestrator.cache().request_dir(&handle.request_id).unwrap();
    assert_eq!(std::fs::read_to_string(dir.transcript_file()).unwrap(), "");

    let status = harness.orchestrator.poll(&handle.request_id).await.unwrap();
    assert_eq!(status.stage, ProcessingStage::Completed);
}

#[tokio::test]
async fn test_missing_caption_is_recreated() {
    let harness = HarnessBuilder::new(PostKind::Images(1))
        .downloader(|d| d.without_caption())
        .build()
        .await;
    let session = SessionId::new();

    let mut handle = harness.orchestrator.start(&session, POST).await.unwrap();
    let events = collect_events(&mut handle.events).await;
    handle.task.take().unwrap().await.unwrap();

    let document = result_document(&events);
    assert!(document.listing.description.starts_with("0 / "));

    let dir = harness.orchestrator.cache().request_dir(&handle.request_id).unwrap();
    assert_eq!(std::fs::read_to_string(dir.caption_file()).unwrap(), "");
}

#[tokio::test]
async fn test_download_failure_is_fatal() {
    let harness = HarnessBuilder::new(PostKind::Fail("private post".to_string()))
        .build()
        .await;
    let session = SessionId::new();

    let mut handle = harness.orchestrator.start(&session, POST).await.unwrap();
    let events = collect_events(&mut handle.events).await;
    let outcome = handle.task.take().unwrap().await.unwrap();
    assert!(matches!(outcome, RunOutcome::Failed(ref m) if m.contains("private post")));

    assert_eq!(events.len(), 2);
    assert_eq!(progress_values(&events), vec![20]);
    match &events[1] {
        ProgressEvent::Error { message, .. } => assert!(message.contains("private post")),
        other => panic!("expected an error event, got {:?}", other),
    }

    let status = harness.orchestrator.poll(&handle.request_id).await.unwrap();
    assert_eq!(status.stage, ProcessingStage::Failed);
    assert!(status.error_message.unwrap().contains("private post"));

    let dir = harness.orchestrator.cache().request_dir(&handle.request_id).unwrap();
    assert!(!dir.path().exists());
    assert!(harness.orchestrator.cache().lookup(&handle.source).await.unwrap().is_none());
    assert!(harness.orchestrator.result(&handle.request_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_cached_result_is_replayed() {
    let harness = HarnessBuilder::new(PostKind::Images(2)).build().await;

    let mut first = harness.orchestrator.start(&SessionId::new(), POST).await.unwrap();
    let first_events = collect_events(&mut first.events).await;
    first.task.take().unwrap().await.unwrap();
    let original = result_document(&first_events).clone();

    // The same post by shortcode, from another session
    let mut replay = harness
        .orchestrator
        .start(&SessionId::new(), "Cx1Ab2Cd3Ef")
        .await
        .unwrap();
    assert!(replay.replayed);
    assert!(replay.task.is_none());
    assert_eq!(replay.request_id, first.request_id);

    let events = collect_events(&mut replay.events).await;
    assert_eq!(events.len(), 1);
    let document = result_document(&events);
    assert_eq!(document.listing, original.listing);
    assert_eq!(document.images, original.images);
    assert!(document.expires_in_seconds > 0);
    assert!(document.expires_in_seconds <= 600);

    assert_eq!(harness.downloader.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_distinct_posts_are_not_replayed() {
    let harness = HarnessBuilder::new(PostKind::Images(1)).build().await;
    let session = SessionId::new();

    let mut first = harness.orchestrator.start(&session, POST).await.unwrap();
    collect_events(&mut first.events).await;

    let mut second = harness.orchestrator.start(&session, OTHER_POST).await.unwrap();
    assert!(!second.replayed);
    assert_ne!(second.request_id, first.request_id);
    collect_events(&mut second.events).await;

    assert_eq!(harness.downloader.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_invalid_source_is_rejected() {
    let harness = HarnessBuilder::new(PostKind::Video).build().await;

    let err = harness
        .orchestrator
        .start(&SessionId::new(), "https://example.com/p/abc")
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::InvalidSource(_)));
    assert_eq!(harness.downloader.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancel_discards_request() {
    let gate = Arc::new(Semaphore::new(0));
    let harness = HarnessBuilder::new(PostKind::Video)
        .downloader(|d| d.gated(gate.clone()))
        .build()
        .await;
    let session = SessionId::new();

    let mut handle = harness.orchestrator.start(&session, POST).await.unwrap();
    let first = tokio::time::timeout(Duration::from_secs(5), handle.events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        first,
        ProgressEvent::Progress { stage: ProcessingStage::Downloading, .. }
    ));

    assert!(harness.orchestrator.cancel(&handle.request_id).await);
    gate.add_permits(1);

    let outcome = handle.task.take().unwrap().await.unwrap();
    assert_eq!(outcome, RunOutcome::Canceled);

    // No terminal event follows a cancellation
    assert!(collect_events(&mut handle.events).await.is_empty());
    assert_eq!(harness.classifier.calls.load(Ordering::SeqCst), 0);

    let status = harness.orchestrator.poll(&handle.request_id).await.unwrap();
    assert_eq!(status.stage, ProcessingStage::Canceled);

    let dir = harness.orchestrator.cache().request_dir(&handle.request_id).unwrap();
    assert!(!dir.path().exists());
    assert!(harness.orchestrator.cache().lookup(&handle.source).await.unwrap().is_none());

    // Already finished
    assert!(!harness.orchestrator.cancel(&handle.request_id).await);
}

#[tokio::test]
async fn test_end_session_cancels_its_requests() {
    let gate = Arc::new(Semaphore::new(0));
    let harness = HarnessBuilder::new(PostKind::Images(1))
        .downloader(|d| d.gated(gate.clone()))
        .build()
        .await;
    let session = SessionId::new();

    let mut handles = Vec::new();
    for source in [POST, OTHER_POST] {
        let mut handle = harness.orchestrator.start(&session, source).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle.events.recv())
            .await
            .unwrap()
            .unwrap();
        handles.push(handle);
    }

    assert_eq!(harness.orchestrator.end_session(&session).await, 2);
    gate.add_permits(2);

    for mut handle in handles {
        let outcome = handle.task.take().unwrap().await.unwrap();
        assert_eq!(outcome, RunOutcome::Canceled);
        let status = harness.orchestrator.poll(&handle.request_id).await.unwrap();
        assert_eq!(status.stage, ProcessingStage::Canceled);
    }

    assert_eq!(harness.orchestrator.end_session(&session).await, 0);
}

#[tokio::test]
async fn test_subscribe_sees_completion() {
    let harness = HarnessBuilder::new(PostKind::Images(1)).build().await;

    let mut handle = harness.orchestrator.start(&SessionId::new(), POST).await.unwrap();
    let mut status = harness.orchestrator.subscribe(&handle.request_id).await.unwrap();

    let done = tokio::time::timeout(Duration::from_secs(10), status.wait_for(|s| s.is_terminal()))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(done.stage, ProcessingStage::Completed);
    assert_eq!(done.progress, 100);

    collect_events(&mut handle.events).await;
}

#[tokio::test]
async fn test_result_and_discard() {
    let harness = HarnessBuilder::new(PostKind::Images(2)).build().await;

    let mut handle = harness.orchestrator.start(&SessionId::new(), POST).await.unwrap();
    let events = collect_events(&mut handle.events).await;
    handle.task.take().unwrap().await.unwrap();
    let original = result_document(&events).clone();

    let reloaded = harness
        .orchestrator
        .result(&handle.request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.listing, original.listing);
    assert_eq!(reloaded.images, original.images);

    assert!(harness.orchestrator.discard(&handle.request_id).await.unwrap());
    assert!(!harness.orchestrator.discard(&handle.request_id).await.unwrap());
    assert!(harness.orchestrator.result(&handle.request_id).await.unwrap().is_none());
    assert!(harness.orchestrator.cache().lookup(&handle.source).await.unwrap().is_none());
}
