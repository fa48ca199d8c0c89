use std::sync::Arc;
use std::time::Duration;

use image::Rgba;

use stampdesk::engine::{
    ClientPoint, DocPoint, Effect, EngineConfig, Event, PageGeometry, PointerKind, PointerMode,
    Viewport,
};
use stampdesk::render::{RenderService, render_blocking};
use stampdesk::test_utils::test_helpers::{
    BrokenOpener, FakeOpener, FakeSource, drag, loaded_engine, page_color, solid_stamp,
};
use stampdesk::{Session, SessionOptions};

const BLUE: Rgba<u8> = Rgba([20, 20, 200, 255]);

fn column_viewport() -> Viewport {
    Viewport::new(620.0, 1000.0, 1.0)
}

fn assert_window_matches_scroll(engine: &stampdesk::engine::Engine) {
    let page_count = engine.document().unwrap().page_count;
    let expected: Vec<usize> = engine.window().loaded_range(page_count).collect();
    let mut bound = engine.window().bound_pages();
    bound.sort_unstable();
    assert_eq!(bound, expected, "bound pages must be the loaded range");

    let first_visible = engine.first_visible_page().unwrap();
    assert!(
        expected.contains(&first_visible),
        "first visible page {first_visible} not bound in {expected:?}"
    );
}

#[test]
fn place_then_drag_across_pages() {
    let mut engine = loaded_engine(EngineConfig::default(), column_viewport(), 3, 600.0, 800.0);
    engine
        .dispatch(Event::PlaceStamp(solid_stamp(100, 50, BLUE)))
        .unwrap();
    let id = engine.selection().unwrap().stamp;
    assert_eq!(engine.mode(), PointerMode::Select);

    // client (70,70) is document (60,60) on page 0, inside the stamp at (50,50)
    engine
        .dispatch(Event::PointerDown(ClientPoint::new(70.0, 70.0)))
        .unwrap();
    assert!(engine.selection().unwrap().pressed);

    // page 1 starts at y = 10 + 810
    let effects = engine
        .dispatch(Event::PointerMove(ClientPoint::new(90.0, 895.0)))
        .unwrap();
    assert!(effects.contains(&Effect::RepaintOverlay(0)));
    assert!(effects.contains(&Effect::RepaintOverlay(1)));

    engine
        .dispatch(Event::PointerUp(ClientPoint::new(90.0, 895.0)))
        .unwrap();
    let stamp = engine.overlay().get(id).unwrap();
    assert_eq!(stamp.page, 1);
    assert_eq!(stamp.position, DocPoint::new(70.0, 65.0));
    assert!(!engine.selection().unwrap().pressed);

    // the old page no longer shows the stamp, the new one does
    let old = engine.window().slot_for_page(0).unwrap();
    assert!(old.overlay.is_blank());
    let new = engine.window().slot_for_page(1).unwrap();
    assert_eq!(new.overlay.pixels().get_pixel(100, 90).0, BLUE.0);
}

#[test]
fn zoom_keeps_the_reading_position_bound() {
    let mut engine = loaded_engine(EngineConfig::default(), column_viewport(), 10, 600.0, 800.0);
    engine
        .dispatch(Event::ScrollChanged {
            top: 10.0 + 4.0 * 810.0,
            left: 0.0,
        })
        .unwrap();
    assert_eq!(engine.first_visible_page(), Some(4));

    let effects = engine
        .dispatch(Event::ZoomChanged { percent: 150.0 })
        .unwrap();
    assert!(effects.contains(&Effect::RequestContentPass));
    assert!(engine.first_visible_page().unwrap() <= 4);
    assert!(engine.window().bound_pages().iter().all(|&p| p < 10));
    assert_window_matches_scroll(&engine);
}

#[test]
fn window_tracks_scroll_through_mixed_events() {
    let mut engine = loaded_engine(EngineConfig::default(), column_viewport(), 25, 600.0, 800.0);
    let events = [
        Event::ScrollChanged { top: 900.0, left: 0.0 },
        Event::ScrollChanged { top: 2500.0, left: 0.0 },
        Event::ZoomIn,
        Event::ScrollChanged { top: 100_000.0, left: 0.0 },
        Event::Resized {
            width: 400.0,
            height: 300.0,
            pixel_density: 2.0,
        },
        Event::ScrollChanged { top: 1200.0, left: 0.0 },
        Event::ZoomOut,
        Event::ZoomOut,
        Event::ScrollChanged { top: 0.0, left: 0.0 },
    ];
    for event in events {
        engine.dispatch(event).unwrap();
        assert_window_matches_scroll(&engine);
        assert!(engine.window().pool_size() >= 3);
    }
}

#[test]
fn small_scroll_reuses_slots_by_identity() {
    let mut engine = loaded_engine(EngineConfig::default(), column_viewport(), 20, 600.0, 800.0);
    engine
        .dispatch(Event::ScrollChanged {
            top: 10.0 + 6.0 * 810.0,
            left: 0.0,
        })
        .unwrap();
    let before: Vec<_> = engine
        .window()
        .slots()
        .filter_map(|s| s.page().map(|p| (p, s.id(), s.generation())))
        .collect();

    engine
        .dispatch(Event::ScrollChanged {
            top: 10.0 + 7.0 * 810.0,
            left: 0.0,
        })
        .unwrap();

    // pages that stay in the window keep their slot and generation
    for (page, id, generation) in before {
        if let Some(slot) = engine.window().slot_for_page(page) {
            assert_eq!(slot.id(), id, "page {page} moved to another slot");
            assert_eq!(slot.generation(), generation);
        }
    }
}

#[test]
fn front_most_stamp_wins_and_recency_orders_the_stack() {
    let mut engine = loaded_engine(EngineConfig::default(), column_viewport(), 1, 600.0, 800.0);
    engine
        .dispatch(Event::PlaceStamp(solid_stamp(100, 100, BLUE)))
        .unwrap();
    let older = engine.selection().unwrap().stamp;
    engine
        .dispatch(Event::PlaceStamp(solid_stamp(100, 100, Rgba([200, 0, 0, 255]))))
        .unwrap();
    let newer = engine.selection().unwrap().stamp;

    // both cover document (60,60); the newer one is on top
    drag(&mut engine, ClientPoint::new(70.0, 70.0), ClientPoint::new(370.0, 370.0)).unwrap();
    assert_eq!(engine.selection().unwrap().stamp, newer);
    assert_eq!(engine.overlay().get(newer).unwrap().position, DocPoint::new(350.0, 350.0));

    // touching the older stamp brings it to the front of the stack
    drag(&mut engine, ClientPoint::new(70.0, 70.0), ClientPoint::new(370.0, 370.0)).unwrap();
    assert_eq!(engine.selection().unwrap().stamp, older);
    let order: Vec<_> = engine.overlay().iter().map(|s| s.id).collect();
    assert_eq!(order, vec![older, newer]);

    // now stacked on the same spot, the older stamp is hit first
    engine
        .dispatch(Event::PointerDown(ClientPoint::new(370.0, 370.0)))
        .unwrap();
    assert_eq!(engine.selection().unwrap().stamp, older);
}

#[test]
fn pen_entry_returns_to_select_after_release() {
    let mut engine = loaded_engine(EngineConfig::default(), column_viewport(), 2, 600.0, 800.0);
    engine
        .dispatch(Event::EntryPointPressed(PointerKind::Pen))
        .unwrap();
    assert_eq!(engine.mode(), PointerMode::ExternalCapture);
    assert!(!engine.controls().native_scroll);

    engine
        .dispatch(Event::PointerDown(ClientPoint::new(300.0, 300.0)))
        .unwrap();
    let effects = engine
        .dispatch(Event::PointerUp(ClientPoint::new(300.0, 300.0)))
        .unwrap();
    assert_eq!(engine.mode(), PointerMode::Select);
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::ControlsChanged(c) if c.mode == PointerMode::Select)));

    engine
        .dispatch(Event::EntryPointPressed(PointerKind::Touch))
        .unwrap();
    assert_eq!(engine.mode(), PointerMode::Pan);
    assert!(engine.controls().native_scroll);
}

#[test]
fn dragging_near_the_bottom_edge_auto_scrolls() {
    let mut engine = loaded_engine(EngineConfig::default(), column_viewport(), 10, 600.0, 800.0);
    engine
        .dispatch(Event::PlaceStamp(solid_stamp(100, 50, BLUE)))
        .unwrap();
    let id = engine.selection().unwrap().stamp;
    engine
        .dispatch(Event::PointerDown(ClientPoint::new(70.0, 70.0)))
        .unwrap();

    let effects = engine
        .dispatch(Event::PointerMove(ClientPoint::new(70.0, 990.0)))
        .unwrap();
    assert!(effects.contains(&Effect::RequestAnimationFrame));

    let effects = engine.dispatch(Event::AnimationFrame).unwrap();
    assert!(effects.contains(&Effect::ScrollTo { top: 12.0, left: 0.0 }));
    assert!(effects.contains(&Effect::RequestAnimationFrame));
    assert_eq!(engine.viewport().scroll_top, 12.0);

    // content y = 12 + 990 - 10 = 992, i.e. 182 into page 1
    let stamp = engine.overlay().get(id).unwrap();
    assert_eq!(stamp.page, 1);
    assert_eq!(stamp.position, DocPoint::new(50.0, 172.0));

    engine
        .dispatch(Event::PointerUp(ClientPoint::new(70.0, 990.0)))
        .unwrap();
    let effects = engine.dispatch(Event::AnimationFrame).unwrap();
    assert!(!effects.contains(&Effect::RequestAnimationFrame));
    assert_eq!(engine.viewport().scroll_top, 12.0);
}

#[test]
fn blocking_render_fills_every_bound_slot() {
    let source = FakeSource::uniform(4, 600.0, 800.0);
    let mut engine = loaded_engine(EngineConfig::default(), column_viewport(), 4, 600.0, 800.0);

    let effects = render_blocking(&mut engine, &source).unwrap();
    assert!(effects.iter().any(|e| matches!(e, Effect::PassComplete(_))));
    assert!(!engine.is_pass_in_flight());
    assert_eq!(source.render_count(), engine.window().bound_pages().len());

    for slot in engine.window().slots() {
        let Some(page) = slot.page() else { continue };
        assert!(!slot.is_content_dirty());
        assert_eq!(slot.content.pixels().get_pixel(5, 5).0, page_color(page).0);
    }
}

#[test]
fn session_settles_through_worker_pool_and_reuses_cache() {
    let source = FakeSource::uniform(6, 600.0, 800.0);
    let opener = FakeOpener::new(source.clone());
    let options = SessionOptions {
        viewport: column_viewport(),
        settle_timeout: Duration::from_secs(10),
        ..SessionOptions::default()
    };
    let mut session = Session::new(opener, Vec::new(), options).unwrap();
    session.settle().unwrap();

    let engine = session.engine();
    for slot in engine.window().slots() {
        if let Some(page) = slot.page() {
            assert_eq!(slot.content.pixels().get_pixel(1, 1).0, page_color(page).0);
        }
    }
    let first_pass = source.render_count();
    assert!(first_pass > 0);

    session.apply(Event::ZoomChanged { percent: 150.0 }).unwrap();
    session.settle().unwrap();
    let after_zoom = source.render_count();
    assert!(after_zoom > first_pass);

    // back at 100% every page comes from the cache
    session.apply(Event::ZoomChanged { percent: 100.0 }).unwrap();
    session.settle().unwrap();
    assert_eq!(source.render_count(), after_zoom);
    assert!(session.failures().is_empty());
}

#[test]
fn failed_pages_are_reported_not_retried() {
    let source = FakeSource::uniform(3, 600.0, 800.0).failing_on(1);
    let options = SessionOptions {
        viewport: column_viewport(),
        workers: 1,
        ..SessionOptions::default()
    };
    let mut session = Session::new(FakeOpener::new(source), Vec::new(), options).unwrap();
    session.settle().unwrap();

    assert_eq!(session.failures().len(), 1);
    assert_eq!(session.failures()[0].0, 1);
    let slot = session.engine().window().slot_for_page(1).unwrap();
    assert!(!slot.is_content_dirty());
}

#[test]
fn worker_that_cannot_open_answers_with_errors() {
    let mut engine = loaded_engine(EngineConfig::default(), column_viewport(), 2, 600.0, 800.0);
    let mut service = RenderService::with_config(Arc::new(BrokenOpener), 2, 4);

    assert!(service.start_pass(&mut engine).unwrap().is_empty());
    assert!(engine.is_pass_in_flight());

    let effects = service
        .wait(&mut engine, Duration::from_secs(10))
        .unwrap();
    assert!(!engine.is_pass_in_flight());
    let failures = effects
        .iter()
        .filter(|e| matches!(e, Effect::RenderFailed { .. }))
        .count();
    assert_eq!(failures, engine.window().bound_pages().len());
}

#[test]
fn rotated_reference_pages_keep_their_declared_rotation() {
    let source = FakeSource::with_pages(vec![
        PageGeometry::new(600.0, 800.0),
        PageGeometry::new(600.0, 800.0).with_rotation(90),
    ]);
    let reference = stampdesk::source::reference_geometry(&source).unwrap();
    assert_eq!(reference.rotation, 0);
    assert_eq!(
        stampdesk::source::DocumentSource::page_geometry(&source, 1)
            .unwrap()
            .rotation,
        90
    );
}
