use std::rc::Rc;

use folio::document::{
    Document, DocumentObserver, ExportError, Link, LinkAction, NormalizedRect, ObserverId,
    OpenError, Page, Viewport, VisiblePageRect,
};
use folio::generator::Permissions;
use folio::test_utils::{MockGenerator, MockScript, ObservedEvent, RecordingObserver};
use tempfile::NamedTempFile;

fn mock_file() -> NamedTempFile {
    tempfile::Builder::new()
        .suffix(".mock")
        .tempfile()
        .expect("temp file")
}

fn open(script: MockScript) -> (Document, NamedTempFile) {
    let (registry, _handle) = MockGenerator::registry(script);
    let file = mock_file();
    let mut doc = Document::with_registry(registry);
    doc.open_document(file.path(), None).expect("opens");
    (doc, file)
}

fn four_pages() -> MockScript {
    MockScript::with_pages(["one", "two", "three", "four"])
}

#[test]
fn test_viewport_string_round_trip() {
    let mut viewport = Viewport::centered_at(12, 0.1, 1.0 / 3.0);
    viewport.auto_fit.enabled = true;
    viewport.auto_fit.height = true;

    let encoded = viewport.encode();
    let decoded = Viewport::decode(&encoded).expect("decodes");
    assert_eq!(decoded, viewport);
    assert_eq!(decoded.re_pos.normalized_y, 1.0 / 3.0);
}

#[test]
fn test_add_then_remove_observer_leaves_registry_empty() {
    let (mut doc, _file) = open(four_pages());
    let observer = RecordingObserver::new(1);

    assert!(doc.add_observer(&observer.as_observer()));
    assert!(!doc.add_observer(&observer.as_observer()));
    assert_eq!(doc.observer_count(), 1);

    assert!(doc.remove_observer(observer.id()));
    assert!(!doc.remove_observer(observer.id()));
    assert_eq!(doc.observer_count(), 0);
}

#[test]
fn test_observer_added_to_open_document_gets_setup() {
    let (mut doc, _file) = open(four_pages());
    let observer = RecordingObserver::new(1);
    doc.add_observer(&observer.as_observer());

    assert_eq!(
        observer.events(),
        vec![ObservedEvent::Setup {
            pages: 4,
            document_changed: true
        }]
    );
}

#[test]
fn test_set_viewport_never_notifies_excluded_observer() {
    let (mut doc, _file) = open(four_pages());
    let view = RecordingObserver::new(1);
    let thumbnails = RecordingObserver::new(2);
    doc.add_observer(&view.as_observer());
    doc.add_observer(&thumbnails.as_observer());
    view.clear();
    thumbnails.clear();

    doc.set_viewport(Viewport::new(2), view.id(), true);

    assert!(view.viewports().is_empty());
    assert_eq!(thumbnails.viewports(), vec![Viewport::new(2)]);
    assert_eq!(doc.current_page(), Some(2));
}

#[test]
fn test_sentinel_exclude_notifies_everyone() {
    let (mut doc, _file) = open(four_pages());
    let a = RecordingObserver::new(1);
    let b = RecordingObserver::new(2);
    doc.add_observer(&a.as_observer());
    doc.add_observer(&b.as_observer());

    doc.set_viewport_page(1, ObserverId::NONE, false);

    assert_eq!(a.viewports().len(), 1);
    assert_eq!(b.viewports().len(), 1);
}

#[test]
fn test_history_back_twice_returns_to_start() {
    let (mut doc, _file) = open(four_pages());
    let a = Viewport::new(0);
    let b = Viewport::new(1);
    let c = Viewport::new(2);
    doc.set_viewport(a, ObserverId::NONE, false);
    doc.set_viewport(b, ObserverId::NONE, false);
    doc.set_viewport(c, ObserverId::NONE, false);

    doc.set_prev_viewport();
    doc.set_prev_viewport();

    assert_eq!(*doc.viewport(), a);
    assert!(doc.history_at_begin());
    assert!(!doc.history_at_end());

    // Boundary is a no-op
    doc.set_prev_viewport();
    assert_eq!(*doc.viewport(), a);
}

#[test]
fn test_new_navigation_discards_forward_history() {
    let (mut doc, _file) = open(four_pages());
    doc.set_viewport_page(1, ObserverId::NONE, false);
    doc.set_viewport_page(2, ObserverId::NONE, false);
    doc.set_prev_viewport();

    doc.set_viewport_page(3, ObserverId::NONE, false);
    assert!(doc.history_at_end());

    doc.set_prev_viewport();
    assert_eq!(doc.current_page(), Some(1));
    doc.set_next_viewport();
    assert_eq!(doc.current_page(), Some(3));
}

#[test]
fn test_back_and_forward_notify_all_observers() {
    let (mut doc, _file) = open(four_pages());
    let view = RecordingObserver::new(1);
    doc.add_observer(&view.as_observer());
    doc.set_viewport_page(1, view.id(), false);

    doc.set_prev_viewport();
    doc.set_next_viewport();

    assert_eq!(view.viewports(), vec![Viewport::new(0), Viewport::new(1)]);
}

struct Exploding;

impl DocumentObserver for Exploding {
    fn observer_id(&self) -> ObserverId {
        ObserverId::new(7)
    }

    fn notify_viewport_changed(&self, _viewport: &Viewport, _smooth_move: bool) {
        panic!("observer bug");
    }
}

#[test]
fn test_panicking_observer_does_not_stop_fan_out() {
    let (mut doc, _file) = open(four_pages());
    let exploding: Rc<dyn DocumentObserver> = Rc::new(Exploding);
    let view = RecordingObserver::new(1);
    doc.add_observer(&exploding);
    doc.add_observer(&view.as_observer());

    doc.set_viewport_page(3, ObserverId::NONE, false);

    assert_eq!(view.viewports(), vec![Viewport::new(3)]);
}

#[test]
fn test_dropped_observer_is_pruned() {
    let (mut doc, _file) = open(four_pages());
    {
        let transient = RecordingObserver::new(5);
        doc.add_observer(&transient.as_observer());
    }
    assert_eq!(doc.observer_count(), 1);

    doc.set_viewport_page(1, ObserverId::NONE, false);
    assert_eq!(doc.observer_count(), 0);
}

#[test]
fn test_open_and_close_notify_in_order() {
    let (registry, _handle) = MockGenerator::registry(four_pages());
    let file = mock_file();
    let mut doc = Document::with_registry(registry);
    let view = RecordingObserver::new(1);
    doc.add_observer(&view.as_observer());

    doc.open_document(file.path(), None).expect("opens");
    doc.close_document();

    assert_eq!(
        view.events(),
        vec![
            ObservedEvent::Setup {
                pages: 4,
                document_changed: true
            },
            ObservedEvent::ViewportChanged {
                viewport: Viewport::new(0),
                smooth_move: false
            },
            ObservedEvent::Setup {
                pages: 0,
                document_changed: true
            },
            ObservedEvent::DocumentClosed,
        ]
    );
    assert!(!doc.is_opened());
    assert!(doc.current_document().is_none());
}

#[test]
fn test_failed_load_leaves_document_closed() {
    let mut script = four_pages();
    script.load_failure = Some("corrupt header".into());
    let (registry, _handle) = MockGenerator::registry(script);
    let file = mock_file();
    let mut doc = Document::with_registry(registry);
    let view = RecordingObserver::new(1);
    doc.add_observer(&view.as_observer());

    let err = doc.open_document(file.path(), None).expect_err("fails");
    assert!(matches!(err, OpenError::GeneratorLoadFailed { .. }));
    assert!(err.to_string().contains("corrupt header"));
    assert!(!doc.is_opened());
    assert!(doc.pages().is_empty());
    assert!(view.events().is_empty());
}

#[test]
fn test_mime_hint_selects_generator() {
    let (registry, _handle) = MockGenerator::registry(four_pages());
    let file = tempfile::Builder::new()
        .suffix(".bin")
        .tempfile()
        .expect("temp file");
    let mut doc = Document::with_registry(registry);

    assert!(matches!(
        doc.open_document(file.path(), None),
        Err(OpenError::UnsupportedFormat { .. })
    ));
    doc.open_document(file.path(), Some(folio::test_utils::MOCK_MIME))
        .expect("opens with hint");
    assert_eq!(doc.mime_type(), Some(folio::test_utils::MOCK_MIME));
}

#[test]
fn test_synopsis_named_destinations_are_resolved() {
    let (doc, _file) = open(four_pages());
    let synopsis = doc.document_synopsis().expect("synopsis");

    assert_eq!(synopsis.entries[0].viewport, Some(Viewport::new(3)));
    assert_eq!(doc.named_viewport("last"), Some(Viewport::new(3)));
    assert_eq!(doc.document_info().map(|i| i.get("pages")), Some("4"));
}

#[test]
fn test_rotation_requires_generator_support() {
    let (mut doc, _file) = open(four_pages());
    assert!(!doc.set_rotation(folio::document::Rotation::Half));

    let mut script = four_pages();
    script.rotation = true;
    let (mut doc, _file) = open(script);
    let view = RecordingObserver::new(1);
    doc.add_observer(&view.as_observer());
    view.clear();

    assert!(doc.set_rotation(folio::document::Rotation::Quarter));
    assert_eq!(
        view.events(),
        vec![ObservedEvent::Setup {
            pages: 4,
            document_changed: false
        }]
    );
    let page: &Page = doc.page(0).expect("page");
    assert_eq!(page.size().width, 200.0);
}

#[test]
fn test_history_returns_to_scrolled_start() {
    let (mut doc, _file) = open(four_pages());
    let a = Viewport::centered_at(0, 0.5, 0.2);
    doc.set_viewport(a, ObserverId::NONE, false);
    doc.set_viewport_page(1, ObserverId::NONE, false);
    doc.set_viewport_page(2, ObserverId::NONE, false);

    doc.set_prev_viewport();
    doc.set_prev_viewport();

    assert_eq!(*doc.viewport(), a);
    assert!(doc.history_at_begin());
}

#[test]
fn test_scrolling_within_page_rewrites_history_entry() {
    let (mut doc, _file) = open(four_pages());
    doc.set_viewport_page(1, ObserverId::NONE, false);
    for step in 1..=4 {
        let y = f64::from(step) * 0.2;
        doc.set_viewport(Viewport::centered_at(1, 0.5, y), ObserverId::NONE, false);
    }

    doc.set_prev_viewport();
    assert_eq!(doc.current_page(), Some(0));
    assert!(doc.history_at_begin());

    // Forward lands on the last scroll position
    doc.set_next_viewport();
    assert_eq!(*doc.viewport(), Viewport::centered_at(1, 0.5, 0.8));
    assert!(doc.history_at_end());
}

#[test]
fn test_visible_rects_skip_excluded_observer() {
    let (mut doc, _file) = open(four_pages());
    let view = RecordingObserver::new(1);
    let thumbnails = RecordingObserver::new(2);
    doc.add_observer(&view.as_observer());
    doc.add_observer(&thumbnails.as_observer());
    view.clear();
    thumbnails.clear();

    let shown = NormalizedRect::new(0.0, 0.5, 1.0, 1.0);
    doc.set_visible_page_rects(
        vec![
            VisiblePageRect::new(1, shown),
            VisiblePageRect::new(2, NormalizedRect::new(0.0, 0.0, 1.0, 0.5)),
            VisiblePageRect::new(9, shown),
            VisiblePageRect::new(3, NormalizedRect::new(0.5, 0.5, 0.5, 0.9)),
        ],
        view.id(),
    );

    assert!(view.take_events().is_empty());
    assert_eq!(thumbnails.take_events(), vec![ObservedEvent::VisibleRectsChanged]);
    let pages: Vec<usize> = doc.visible_page_rects().iter().map(|r| r.page).collect();
    assert_eq!(pages, vec![1, 2]);

    doc.set_visible_page_rects(Vec::new(), ObserverId::NONE);
    assert_eq!(view.take_events(), vec![ObservedEvent::VisibleRectsChanged]);
    assert!(doc.visible_page_rects().is_empty());
}

#[test]
fn test_visible_rects_cleared_on_close() {
    let (mut doc, _file) = open(four_pages());
    doc.set_visible_page_rects(
        vec![VisiblePageRect::new(0, NormalizedRect::new(0.0, 0.0, 1.0, 1.0))],
        ObserverId::NONE,
    );
    assert_eq!(doc.visible_page_rects().len(), 1);

    doc.close_document();
    assert!(doc.visible_page_rects().is_empty());
}

#[test]
fn test_goto_and_named_links_move_viewport() {
    let (mut doc, _file) = open(four_pages());
    let view = RecordingObserver::new(1);
    doc.add_observer(&view.as_observer());
    view.clear();

    assert!(doc.process_link(&Link::Goto(Viewport::centered_at(2, 0.5, 0.5))));
    assert_eq!(doc.current_page(), Some(2));
    assert!(doc.process_link(&Link::Named("last".into())));
    assert_eq!(doc.current_page(), Some(3));
    assert_eq!(view.viewports().len(), 2);

    assert!(!doc.process_link(&Link::Named("nowhere".into())));
    assert!(!doc.process_link(&Link::Goto(Viewport::new(12))));
    assert_eq!(doc.current_page(), Some(3));
}

#[test]
fn test_action_links_page_and_walk_history() {
    let (mut doc, _file) = open(four_pages());

    assert!(!doc.process_link(&Link::Action(LinkAction::PrevPage)));
    assert!(doc.process_link(&Link::Action(LinkAction::NextPage)));
    assert_eq!(doc.current_page(), Some(1));
    assert!(doc.process_link(&Link::Action(LinkAction::LastPage)));
    assert_eq!(doc.current_page(), Some(3));
    assert!(!doc.process_link(&Link::Action(LinkAction::NextPage)));

    assert!(doc.process_link(&Link::Action(LinkAction::HistoryBack)));
    assert_eq!(doc.current_page(), Some(1));
    assert!(doc.process_link(&Link::Action(LinkAction::HistoryForward)));
    assert!(!doc.process_link(&Link::Action(LinkAction::HistoryForward)));

    assert!(doc.process_link(&Link::Action(LinkAction::FirstPage)));
    assert_eq!(doc.current_page(), Some(0));
}

#[test]
fn test_permissions_come_from_generator() {
    let closed = Document::with_registry(MockGenerator::registry(four_pages()).0);
    assert!(!closed.is_allowed(Permissions::PRINT));

    let (doc, _file) = open(four_pages());
    assert!(doc.is_allowed(Permissions::COPY | Permissions::PRINT));

    let mut script = four_pages();
    script.permissions = Permissions::PRINT;
    let (doc, _file) = open(script);
    assert!(doc.is_allowed(Permissions::PRINT));
    assert!(!doc.is_allowed(Permissions::COPY | Permissions::PRINT));
}

#[test]
fn test_export_to_text_writes_every_page() {
    let (doc, _file) = open(four_pages());
    let out = tempfile::tempdir().expect("tempdir");
    let path = out.path().join("export.txt");

    assert!(doc.can_export_to_text());
    doc.export_to_text(&path).expect("exports");

    let text = std::fs::read_to_string(&path).expect("read export");
    assert_eq!(text, "one\ntwo\nthree\nfour\n");
}

#[test]
fn test_export_refused_without_copy_permission() {
    let mut script = four_pages();
    script.permissions = Permissions::PRINT;
    let (doc, _file) = open(script);
    let out = tempfile::tempdir().expect("tempdir");
    let path = out.path().join("export.txt");

    assert!(matches!(
        doc.export_to_text(&path),
        Err(ExportError::NotAllowed)
    ));
    assert!(!path.exists());
}

#[test]
fn test_registry_can_be_extended_after_construction() {
    let file = mock_file();
    let mut doc = Document::new();
    assert!(matches!(
        doc.open_document(file.path(), None),
        Err(OpenError::UnsupportedFormat { .. })
    ));

    doc.registry_mut().register(
        folio::test_utils::MOCK_MIME,
        &[folio::test_utils::MOCK_EXTENSION],
        || -> Box<dyn folio::Generator> {
            Box::new(MockGenerator::new(
                MockScript::with_pages(["only"]),
                folio::test_utils::MockHandle::default(),
            ))
        },
    );
    doc.open_document(file.path(), None).expect("opens");
    assert_eq!(doc.page_count(), 1);
}
