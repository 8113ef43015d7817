use std::time::{Duration, Instant};

use folio::document::{ChangeFlags, Document, ObserverId, PixmapRequest, Rotation};
use image::Rgba;
use folio::test_utils::{MockGenerator, MockHandle, MockScript, RecordingObserver};
use tempfile::NamedTempFile;

struct Fixture {
    doc: Document,
    handle: MockHandle,
    view: std::rc::Rc<RecordingObserver>,
    _file: NamedTempFile,
}

fn fixture(script: MockScript) -> Fixture {
    let (registry, handle) = MockGenerator::registry(script);
    let file = tempfile::Builder::new()
        .suffix(".mock")
        .tempfile()
        .expect("temp file");
    let mut doc = Document::with_registry(registry);
    let view = RecordingObserver::new(1);
    doc.add_observer(&view.as_observer());
    doc.open_document(file.path(), None).expect("opens");
    view.clear();
    Fixture {
        doc,
        handle,
        view,
        _file: file,
    }
}

fn pages(n: usize) -> MockScript {
    MockScript::with_pages((0..n).map(|i| format!("page {i}")))
}

fn drain(doc: &mut Document) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while doc.has_pending_requests() && Instant::now() < deadline {
        doc.wait_for_completions(Duration::from_millis(20));
    }
    assert!(!doc.has_pending_requests(), "requests did not finish in time");
}

fn request(observer: ObserverId, page: usize, size: u32) -> PixmapRequest {
    PixmapRequest::new(observer, page, size, size)
}

#[test]
fn test_only_latest_request_is_delivered() {
    let mut f = fixture(pages(2));
    f.handle.pause();

    f.doc.request_pixmaps(vec![request(f.view.id(), 0, 10)]);
    f.doc.request_pixmaps(vec![request(f.view.id(), 0, 20)]);
    f.handle.resume();
    drain(&mut f.doc);

    assert_eq!(f.view.pages_changed(ChangeFlags::PIXMAP), vec![0]);
    let pixmap = f
        .doc
        .page(0)
        .and_then(|p| p.pixmap(f.view.id()))
        .expect("pixmap");
    assert_eq!(pixmap.dimensions(), (20, 20));
}

#[test]
fn test_duplicate_request_renders_once() {
    let mut f = fixture(pages(2));
    f.handle.pause();

    f.doc.request_pixmaps(vec![
        request(f.view.id(), 1, 30),
        request(f.view.id(), 1, 30),
    ]);
    f.handle.resume();
    drain(&mut f.doc);

    assert_eq!(f.handle.render_count(), 1);
    assert_eq!(f.view.pages_changed(ChangeFlags::PIXMAP), vec![1]);
}

#[test]
fn test_already_rendered_size_is_not_requested_again() {
    let mut f = fixture(pages(1));
    f.doc.request_pixmaps(vec![request(f.view.id(), 0, 16)]);
    drain(&mut f.doc);

    f.doc.request_pixmaps(vec![request(f.view.id(), 0, 16)]);
    assert!(!f.doc.has_pending_requests());
    assert_eq!(f.handle.render_count(), 1);
}

#[test]
fn test_render_failure_leaves_page_empty_and_others_proceed() {
    let mut f = fixture(pages(3).failing(1));

    f.doc.request_pixmaps(vec![
        request(f.view.id(), 0, 8),
        request(f.view.id(), 1, 8),
        request(f.view.id(), 2, 8),
    ]);
    drain(&mut f.doc);

    let mut delivered = f.view.pages_changed(ChangeFlags::PIXMAP);
    delivered.sort_unstable();
    assert_eq!(delivered, vec![0, 2]);
    assert!(f.doc.page(1).and_then(|p| p.pixmap(f.view.id())).is_none());
}

#[test]
fn test_synchronous_requests_wait_for_pump() {
    let mut script = pages(1);
    script.synchronous_only = true;
    let mut f = fixture(script);

    f.doc.request_pixmaps(vec![request(f.view.id(), 0, 12)]);
    assert_eq!(f.handle.render_count(), 0);
    assert!(f.doc.has_pending_requests());

    assert_eq!(f.doc.process_completions(), 1);
    assert_eq!(f.handle.render_count(), 1);
    assert!(f.doc.page(0).is_some_and(|p| p.has_pixmap(f.view.id(), 12, 12)));
}

#[test]
fn test_invalid_requests_are_dropped() {
    let mut f = fixture(pages(2));

    f.doc.request_pixmaps(vec![
        request(f.view.id(), 9, 10),
        request(ObserverId::new(42), 0, 10),
    ]);

    assert!(!f.doc.has_pending_requests());
    assert_eq!(f.doc.process_completions(), 0);
}

#[test]
fn test_pixmap_goes_only_to_requesting_observer() {
    let mut f = fixture(pages(2));
    let other = RecordingObserver::new(2);
    f.doc.add_observer(&other.as_observer());
    other.clear();

    f.doc.request_pixmaps(vec![request(f.view.id(), 1, 10)]);
    drain(&mut f.doc);

    assert_eq!(f.view.pages_changed(ChangeFlags::PIXMAP), vec![1]);
    assert!(other.pages_changed(ChangeFlags::PIXMAP).is_empty());
    assert!(f.doc.page(1).and_then(|p| p.pixmap(other.id())).is_none());
}

#[test]
fn test_memory_budget_unloads_oldest_pixmap() {
    let mut f = fixture(pages(4));
    // Room for two 10x10 RGBA pixmaps
    f.doc.set_pixmap_memory_budget(2 * 10 * 10 * 4);

    for page in 1..=3 {
        f.doc.request_pixmaps(vec![request(f.view.id(), page, 10)]);
        drain(&mut f.doc);
    }

    let has = |page: usize| f.doc.page(page).is_some_and(|p| p.pixmap(f.view.id()).is_some());
    assert!(!has(1));
    assert!(has(2));
    assert!(has(3));
    assert_eq!(f.doc.pixmap_memory().total_bytes(), 2 * 10 * 10 * 4);
}

#[test]
fn test_observer_can_veto_unloading() {
    let mut f = fixture(pages(4));
    f.view.pin(1);
    f.doc.set_pixmap_memory_budget(2 * 10 * 10 * 4);

    for page in 1..=3 {
        f.doc.request_pixmaps(vec![request(f.view.id(), page, 10)]);
        drain(&mut f.doc);
    }

    let has = |page: usize| f.doc.page(page).is_some_and(|p| p.pixmap(f.view.id()).is_some());
    assert!(has(1));
    assert!(!has(2));
    assert!(has(3));
}

#[test]
fn test_removing_observer_drops_its_pixmaps() {
    let mut f = fixture(pages(2));
    f.doc.request_pixmaps(vec![request(f.view.id(), 0, 10)]);
    drain(&mut f.doc);

    assert!(f.doc.remove_observer(f.view.id()));
    assert!(f.doc.page(0).and_then(|p| p.pixmap(f.view.id())).is_none());
    assert!(f.doc.pixmap_memory().is_empty());
}

#[test]
fn test_text_page_is_extracted_once() {
    let mut f = fixture(pages(2));

    assert!(f.doc.request_text_page(1));
    assert!(!f.doc.request_text_page(1));

    let deadline = Instant::now() + Duration::from_secs(5);
    while !f.doc.page(1).is_some_and(|p| p.has_text_page()) && Instant::now() < deadline {
        f.doc.wait_for_completions(Duration::from_millis(20));
    }

    assert_eq!(
        f.doc.page(1).and_then(|p| p.text_page()).map(|t| t.text().to_string()),
        Some("page 1".to_string())
    );
    assert_eq!(f.view.pages_changed(ChangeFlags::TEXT_PAGE), vec![1]);
    assert!(!f.doc.request_text_page(1));
    assert_eq!(f.handle.extraction_count(), 1);
}

#[test]
fn test_close_discards_in_flight_work() {
    let mut f = fixture(pages(2));
    f.handle.pause();
    f.doc.request_pixmaps(vec![request(f.view.id(), 0, 10)]);

    f.doc.close_document();
    f.handle.resume();

    assert!(!f.doc.has_pending_requests());
    assert_eq!(f.doc.process_completions(), 0);
    assert!(f.view.pages_changed(ChangeFlags::PIXMAP).is_empty());
}

#[test]
fn test_failed_page_renders_again_on_next_request() {
    let mut f = fixture(pages(2).failing(1));
    f.doc.request_pixmaps(vec![request(f.view.id(), 1, 8)]);
    drain(&mut f.doc);
    assert!(f.doc.page(1).and_then(|p| p.pixmap(f.view.id())).is_none());

    f.handle.set_failing(1, false);
    f.doc.request_pixmaps(vec![request(f.view.id(), 1, 8)]);
    drain(&mut f.doc);

    assert_eq!(f.handle.render_count(), 2);
    assert!(f.doc.page(1).is_some_and(|p| p.has_pixmap(f.view.id(), 8, 8)));
    assert_eq!(f.view.pages_changed(ChangeFlags::PIXMAP), vec![1]);
}

#[test]
fn test_failure_drops_older_pixmap_of_observer() {
    let mut f = fixture(pages(1));
    f.doc.request_pixmaps(vec![request(f.view.id(), 0, 10)]);
    drain(&mut f.doc);
    assert!(!f.doc.pixmap_memory().is_empty());

    f.handle.set_failing(0, true);
    f.view.clear();
    f.doc.request_pixmaps(vec![request(f.view.id(), 0, 20)]);
    drain(&mut f.doc);

    assert!(f.doc.page(0).and_then(|p| p.pixmap(f.view.id())).is_none());
    assert!(f.doc.pixmap_memory().is_empty());
    assert_eq!(f.view.pages_changed(ChangeFlags::PIXMAP), vec![0]);
}

const BLACK: Rgba<u8> = Rgba([0x00, 0x00, 0x00, 0xFF]);
const WHITE: Rgba<u8> = Rgba([0xFF, 0xFF, 0xFF, 0xFF]);

#[test]
fn test_pixmaps_follow_page_rotation() {
    let mut script = pages(1);
    script.rotation = true;
    let mut f = fixture(script);

    f.doc.request_pixmaps(vec![request(f.view.id(), 0, 10)]);
    drain(&mut f.doc);
    let upright = f.doc.page(0).and_then(|p| p.pixmap(f.view.id())).expect("pixmap");
    assert_eq!(upright.get_pixel(0, 0), &BLACK);
    assert_eq!(upright.get_pixel(9, 9), &WHITE);

    assert!(f.doc.set_rotation(Rotation::Half));
    f.doc.request_pixmaps(vec![request(f.view.id(), 0, 10)]);
    drain(&mut f.doc);
    let turned = f.doc.page(0).and_then(|p| p.pixmap(f.view.id())).expect("pixmap");
    assert_eq!(turned.get_pixel(0, 0), &WHITE);
    assert_eq!(turned.get_pixel(9, 9), &BLACK);
}

#[test]
fn test_quarter_turn_renders_upright_then_rotates() {
    let mut script = pages(1);
    script.rotation = true;
    let mut f = fixture(script);
    assert!(f.doc.set_rotation(Rotation::Quarter));

    f.doc
        .request_pixmaps(vec![PixmapRequest::new(f.view.id(), 0, 40, 20)]);
    drain(&mut f.doc);

    assert_eq!(f.handle.last_render_size(), Some((20, 40)));
    let pixmap = f.doc.page(0).and_then(|p| p.pixmap(f.view.id())).expect("pixmap");
    assert_eq!(pixmap.dimensions(), (40, 20));
    // The black top left quadrant of the upright page ends up top right
    assert_eq!(pixmap.get_pixel(39, 0), &BLACK);
    assert_eq!(pixmap.get_pixel(0, 0), &WHITE);
    assert!(f.doc.page(0).is_some_and(|p| p.has_pixmap(f.view.id(), 40, 20)));
}
