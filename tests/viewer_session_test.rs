use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use biopsy_viewer::catalog::DocumentDescriptor;
use biopsy_viewer::test_utils::{
    FAKE_PAGE_SIZE, FakeDecoder, MemorySource, RecordingSink, SinkEvent, fake_document,
};
use biopsy_viewer::viewer::{SessionConfig, TaskState, ViewerFault, ViewerSession};

const SETTLE: Duration = Duration::from_secs(5);

fn descriptor(id: &str, reference: &str) -> DocumentDescriptor {
    DocumentDescriptor::new(id, reference)
        .with_patient("Ana Rojas", "12345678-9")
        .with_date("2024-03-01")
}

fn session(source: MemorySource, decoder: &FakeDecoder, sink: &RecordingSink) -> ViewerSession {
    ViewerSession::new(
        Arc::new(source),
        Arc::new(decoder.clone()),
        Box::new(sink.clone()),
    )
}

#[test]
fn first_entry_renders_pages_in_order() {
    let source = MemorySource::new().with_document("doc101", fake_document(3));
    let decoder = FakeDecoder::new();
    let sink = RecordingSink::new();
    let mut session = session(source, &decoder, &sink);

    session.load_catalog(vec![descriptor("B-101", "doc101")]);
    assert!(session.run_until_settled(SETTLE));

    assert_eq!(
        sink.events(),
        vec![
            SinkEvent::CatalogLoaded(vec!["B-101".to_string()]),
            SinkEvent::SelectionChanged {
                index: 0,
                id: "B-101".to_string()
            },
            SinkEvent::LoadStarted("B-101".to_string()),
            SinkEvent::PageRendered {
                page: 1,
                width_px: 100,
                height_px: 50
            },
            SinkEvent::PageRendered {
                page: 2,
                width_px: 100,
                height_px: 50
            },
            SinkEvent::PageRendered {
                page: 3,
                width_px: 100,
                height_px: 50
            },
            SinkEvent::RenderCompleted(3),
        ]
    );
    assert_eq!(session.active_state(), Some(TaskState::Completed));
    assert_eq!(session.page_count(), Some(3));
}

#[test]
fn newer_selection_supersedes_pending_load() {
    let (source, release) = MemorySource::new()
        .with_document("doc101", fake_document(5))
        .with_document("doc102", fake_document(3))
        .gated("doc101");
    let decoder = FakeDecoder::new();
    let sink = RecordingSink::new();
    let mut session = session(source, &decoder, &sink);

    session.load_catalog(vec![
        descriptor("B-101", "doc101"),
        descriptor("B-102", "doc102"),
    ]);
    // doc101 is still blocked in its fetch
    session.select(1);
    release.send(()).unwrap();

    assert!(session.run_until_settled(SETTLE));

    assert_eq!(sink.pages(), vec![1, 2, 3]);
    assert!(sink.failures().is_empty());
    assert_eq!(
        sink.events().last(),
        Some(&SinkEvent::RenderCompleted(3))
    );
    assert_eq!(session.selected().map(|d| d.id.as_str()), Some("B-102"));
    assert!(decoder.handles().peak() <= 1);
}

#[test]
fn superseded_failure_never_reaches_sink() {
    let (source, release) = MemorySource::new()
        .with_unreachable("doc101", "503 Service Unavailable")
        .with_document("doc102", fake_document(2))
        .gated("doc101");
    let decoder = FakeDecoder::new();
    let sink = RecordingSink::new();
    let mut session = session(source, &decoder, &sink);

    session.load_catalog(vec![
        descriptor("B-101", "doc101"),
        descriptor("B-102", "doc102"),
    ]);
    session.select(1);
    // doc101 fails only after it has been superseded
    release.send(()).unwrap();

    assert!(session.run_until_settled(SETTLE));

    assert!(sink.failures().is_empty());
    assert_eq!(sink.pages(), vec![1, 2]);
    assert_eq!(session.active_state(), Some(TaskState::Completed));
}

#[test]
fn unreachable_reference_fails_once() {
    let source = MemorySource::new().with_unreachable("missing.pdf", "404 Not Found");
    let decoder = FakeDecoder::new();
    let sink = RecordingSink::new();
    let mut session = session(source, &decoder, &sink);

    session.load_catalog(vec![descriptor("B-404", "missing.pdf")]);
    assert!(session.run_until_settled(SETTLE));

    assert!(sink.pages().is_empty());
    let failures = sink.failures();
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        &failures[0],
        ViewerFault::ReferenceUnreachable { reference, .. } if reference == "missing.pdf"
    ));
    assert_eq!(session.active_state(), Some(TaskState::Failed));
    assert_eq!(decoder.handles().opened_total(), 0);
}

#[test]
fn corrupt_document_reports_decode_failure() {
    let source = MemorySource::new().with_document("bad.pdf", b"%PDF-garbage".to_vec());
    let decoder = FakeDecoder::new();
    let sink = RecordingSink::new();
    let mut session = session(source, &decoder, &sink);

    session.load_catalog(vec![descriptor("B-500", "bad.pdf")]);
    assert!(session.run_until_settled(SETTLE));

    let failures = sink.failures();
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0], ViewerFault::DecodeFailed { .. }));
    assert_eq!(decoder.handles().open(), 0);
}

#[test]
fn empty_catalog_selects_nothing() {
    let decoder = FakeDecoder::new();
    let sink = RecordingSink::new();
    let mut session = session(MemorySource::new(), &decoder, &sink);

    session.load_catalog(Vec::new());
    assert!(session.run_until_settled(SETTLE));

    assert_eq!(sink.events(), vec![SinkEvent::CatalogLoaded(Vec::new())]);
    assert_eq!(session.selected_index(), None);
    assert_eq!(session.active_state(), None);
}

#[test]
fn out_of_range_selection_is_ignored() {
    let source = MemorySource::new().with_document("doc101", fake_document(1));
    let decoder = FakeDecoder::new();
    let sink = RecordingSink::new();
    let mut session = session(source, &decoder, &sink);

    session.load_catalog(vec![descriptor("B-101", "doc101")]);
    assert!(session.run_until_settled(SETTLE));
    let generation = session.generation();
    sink.clear();

    session.select(7);
    assert!(session.run_until_settled(SETTLE));

    assert!(sink.events().is_empty());
    assert_eq!(session.generation(), generation);
    assert_eq!(session.selected_index(), Some(0));
}

#[test]
fn unchanged_scale_does_not_rerender() {
    let source = MemorySource::new().with_document("doc101", fake_document(2));
    let decoder = FakeDecoder::new();
    let sink = RecordingSink::new();
    let mut session = session(source, &decoder, &sink);

    session.load_catalog(vec![descriptor("B-101", "doc101")]);
    assert!(session.run_until_settled(SETTLE));
    sink.clear();

    session.set_scale(session.scale());
    session.set_scale(0.0);
    session.set_scale(f32::NAN);
    assert!(session.run_until_settled(SETTLE));
    assert!(sink.events().is_empty());

    session.set_scale(2.0);
    assert!(session.run_until_settled(SETTLE));
    let surfaces = sink.surfaces();
    assert_eq!(surfaces.len(), 2);
    for surface in &surfaces {
        assert_eq!(surface.width_px, (FAKE_PAGE_SIZE.0 * 2.0) as u32);
        assert_eq!(surface.height_px, (FAKE_PAGE_SIZE.1 * 2.0) as u32);
        assert_eq!(surface.pixels.len(), surface.expected_len());
    }
}

#[test]
fn failed_entry_keeps_earlier_render_cached() {
    let source = MemorySource::new()
        .with_document("doc-a", fake_document(2))
        .with_unreachable("doc-b", "connection refused");
    let decoder = FakeDecoder::new();
    let sink = RecordingSink::new();
    let mut session = session(source, &decoder, &sink);

    session.load_catalog(vec![descriptor("A", "doc-a"), descriptor("B", "doc-b")]);
    assert!(session.run_until_settled(SETTLE));
    assert_eq!(session.cached_documents(), 1);

    session.select(1);
    assert!(session.run_until_settled(SETTLE));
    assert_eq!(sink.failures().len(), 1);
    assert_eq!(session.cached_documents(), 1);

    sink.clear();
    session.select(0);
    assert!(session.run_until_settled(SETTLE));

    assert_eq!(sink.pages(), vec![1, 2]);
    assert_eq!(decoder.handles().opened_total(), 1);
}

#[test]
fn failed_entry_can_be_retried() {
    let source = MemorySource::new().with_unreachable("doc-b", "timeout");
    let log = source.fetch_log();
    let decoder = FakeDecoder::new();
    let sink = RecordingSink::new();
    let mut session = session(source, &decoder, &sink);

    session.load_catalog(vec![descriptor("B", "doc-b")]);
    assert!(session.run_until_settled(SETTLE));

    session.select(0);
    assert!(session.run_until_settled(SETTLE));

    assert_eq!(sink.failures().len(), 2);
    assert_eq!(log.lock().unwrap().len(), 2);
}

#[test]
fn dispose_silences_late_results() {
    let (source, release) = MemorySource::new()
        .with_document("doc101", fake_document(2))
        .gated("doc101");
    let decoder = FakeDecoder::new();
    let sink = RecordingSink::new();
    let mut session = session(source, &decoder, &sink);

    session.load_catalog(vec![descriptor("B-101", "doc101")]);
    session.dispose();
    sink.clear();

    release.send(()).unwrap();
    thread::sleep(Duration::from_millis(100));

    assert_eq!(session.poll_responses(), 0);
    session.select(0);
    session.set_scale(3.0);
    session.dispose();

    assert!(session.is_disposed());
    assert!(sink.events().is_empty());
    assert_eq!(decoder.handles().opened_total(), 0);
}

#[test]
fn dispose_mid_render_releases_open_handle() {
    let (entered_tx, entered_rx) = flume::unbounded();
    let (resume_tx, resume_rx) = flume::unbounded::<()>();
    // Hold the first page's rasterization until the test lets it go
    let decoder = FakeDecoder::new().on_rasterize(move |index| {
        if index == 0 {
            let _ = entered_tx.send(());
            let _ = resume_rx.recv();
        }
    });
    let handles = decoder.handles();
    let source = MemorySource::new().with_document("doc101", fake_document(3));
    let sink = RecordingSink::new();
    let mut session = session(source, &decoder, &sink);

    session.load_catalog(vec![descriptor("B-101", "doc101")]);
    entered_rx.recv_timeout(SETTLE).unwrap();
    assert_eq!(handles.open(), 1);

    session.dispose();
    sink.clear();
    resume_tx.send(()).unwrap();

    let deadline = Instant::now() + SETTLE;
    while handles.open() > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(handles.open(), 0);
    assert_eq!(session.poll_responses(), 0);
    assert!(sink.events().is_empty());
    assert_eq!(session.cached_documents(), 0);
}

#[test]
fn several_workers_still_deliver_only_the_latest() {
    let source = MemorySource::new()
        .with_document("doc1", fake_document(4))
        .with_document("doc2", fake_document(4))
        .with_document("doc3", fake_document(2));
    let decoder = FakeDecoder::new();
    let sink = RecordingSink::new();
    let config = SessionConfig {
        workers: 2,
        ..SessionConfig::default()
    };
    let mut session = ViewerSession::with_config(
        config,
        Arc::new(source),
        Arc::new(decoder.clone()),
        Box::new(sink.clone()),
    );

    session.load_catalog(vec![
        descriptor("B-1", "doc1"),
        descriptor("B-2", "doc2"),
        descriptor("B-3", "doc3"),
    ]);
    session.select(1);
    session.select(2);
    assert!(session.run_until_settled(SETTLE));

    // Anything delivered before the last selection belongs to doc1 or doc2 and
    // must precede the final LoadStarted.
    let events = sink.events();
    let last_start = events
        .iter()
        .rposition(|e| *e == SinkEvent::LoadStarted("B-3".to_string()))
        .unwrap();
    let after: Vec<_> = events[last_start + 1..].to_vec();
    assert_eq!(
        after,
        vec![
            SinkEvent::PageRendered {
                page: 1,
                width_px: 100,
                height_px: 50
            },
            SinkEvent::PageRendered {
                page: 2,
                width_px: 100,
                height_px: 50
            },
            SinkEvent::RenderCompleted(2),
        ]
    );
    assert!(decoder.handles().peak() <= 2);
}
