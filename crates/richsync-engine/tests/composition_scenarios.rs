mod common;

use std::time::Duration;

use common::{Harness, blocks, caret};
use pretty_assertions::assert_eq;
use richsync_engine::{
    BlockKey, ChangeType, CompositionPhase, EditorState, Effect, Event, Key, Mode, ResolveTask,
    SessionId,
};

fn composing(lines: &[(&str, &str)], block: &str, offset: usize) -> Harness {
    let state = EditorState::create_with_content(blocks(lines)).accept_selection(caret(block, offset));
    let mut h = Harness::new(state);
    h.place_caret(block, 0, offset);
    h.send(Event::Focus);
    assert!(h.send(Event::CompositionStart).is_empty());
    assert_eq!(h.surface.mode(), Mode::Composite);
    h
}

fn scheduled(effects: &[Effect]) -> ResolveTask {
    match effects {
        [Effect::ScheduleResolve { task, delay }] => {
            assert_eq!(*delay, Duration::from_millis(20));
            *task
        }
        other => panic!("expected one scheduled resolve, got {other:?}"),
    }
}

#[test]
fn redundant_composition_ends_resolve_once() {
    let mut h = composing(&[("b1", "caf")], "b1", 3);
    h.type_into("b1", 0, "café", 4);

    let task = scheduled(&h.send(Event::CompositionEnd));
    assert!(h.send(Event::CompositionEnd).is_empty());
    assert_eq!(h.surface.composition_phase(), CompositionPhase::Resolving);

    let effects = h.send(Event::ResolveTimer(task));
    assert_eq!(
        effects,
        vec![
            Effect::Committed {
                change_type: ChangeType::InsertCharacters,
                version: 1
            },
            Effect::Render {
                force_selection: true
            },
        ]
    );
    assert_eq!(h.text(), "café");
    assert_eq!(h.state().selection(), &caret("b1", 4));
    assert!(!h.state().is_in_composition_mode());
    assert_eq!(h.surface.mode(), Mode::Edit);

    assert!(h.send(Event::ResolveTimer(task)).is_empty());
    assert_eq!(h.state().version(), 1);
}

#[test]
fn restarting_inside_the_grace_period_cancels_the_pending_resolve() {
    let mut h = composing(&[("b1", "ka")], "b1", 2);
    h.type_into("b1", 0, "か", 1);
    let first = scheduled(&h.send(Event::CompositionEnd));

    assert_eq!(h.send(Event::CompositionStart), vec![Effect::CancelResolve(first)]);
    h.type_into("b1", 0, "かな", 2);
    let second = scheduled(&h.send(Event::CompositionEnd));
    assert_eq!(second.session, first.session);
    assert_ne!(second, first);

    assert!(h.send(Event::ResolveTimer(first)).is_empty());
    assert_eq!(h.surface.mode(), Mode::Composite);

    h.send(Event::ResolveTimer(second));
    assert_eq!(h.text(), "かな");
    assert_eq!(h.state().version(), 1);
}

#[test]
fn each_composition_gets_a_new_session() {
    let mut h = composing(&[("b1", "")], "b1", 0);
    let first = scheduled(&h.send(Event::CompositionEnd));
    h.send(Event::ResolveTimer(first));

    h.send(Event::CompositionStart);
    let second = scheduled(&h.send(Event::CompositionEnd));
    assert_eq!(first.session, SessionId(1));
    assert_eq!(second.session, SessionId(2));
}

#[test]
fn composition_without_mutations_only_restores_the_selection() {
    let mut h = composing(&[("b1", "abc")], "b1", 1);
    let task = scheduled(&h.send(Event::CompositionEnd));

    let effects = h.send(Event::ResolveTimer(task));
    assert_eq!(
        effects,
        vec![Effect::Render {
            force_selection: true
        }]
    );
    assert_eq!(h.state().version(), 0);
    assert_eq!(h.state().selection(), &caret("b1", 1));
    assert_eq!(h.surface.mode(), Mode::Edit);
}

#[test]
fn removed_block_is_dropped_from_the_model() {
    let mut h = composing(&[("b1", "one"), ("b2", "two")], "b1", 3);
    let b2 = h.dom.find_block(&BlockKey::from("b2")).unwrap();
    h.dom.remove(b2);
    h.type_into("b1", 0, "one!", 4);

    let task = scheduled(&h.send(Event::CompositionEnd));
    let effects = h.send(Event::ResolveTimer(task));

    assert!(effects.contains(&Effect::Committed {
        change_type: ChangeType::RemoveRange,
        version: 1
    }));
    assert_eq!(h.text(), "one!");
    assert_eq!(h.state().selection(), &caret("b1", 4));
}

#[test]
fn removing_every_block_leaves_one_empty_block() {
    let mut h = composing(&[("b1", "x")], "b1", 1);
    let b1 = h.dom.find_block(&BlockKey::from("b1")).unwrap();
    h.dom.remove(b1);

    let task = scheduled(&h.send(Event::CompositionEnd));
    h.send(Event::ResolveTimer(task));

    let content = h.state().current_content();
    assert_eq!(content.block_count(), 1);
    assert_eq!(h.text(), "");
    let only = content.first_block().key().clone();
    assert_ne!(only, BlockKey::from("b1"));
    assert_eq!(h.state().selection(), &caret(only.as_str(), 0));
    assert!(h.dom.find_block(&only).is_some());
}

#[test]
fn keydown_outside_composition_resolves_immediately() {
    let mut h = composing(&[("b1", "caf")], "b1", 3);
    h.type_into("b1", 0, "café", 4);

    let effects = h.send(Event::KeyDown {
        key: Key::Enter,
        is_composing: false,
    });
    assert_eq!(
        effects,
        vec![
            Effect::Committed {
                change_type: ChangeType::InsertCharacters,
                version: 1
            },
            Effect::Render {
                force_selection: true
            },
            Effect::PreventDefault,
            Effect::Committed {
                change_type: ChangeType::SplitBlock,
                version: 2
            },
            Effect::Render {
                force_selection: true
            },
        ]
    );
    assert_eq!(h.text(), "café|");
    assert_eq!(h.surface.mode(), Mode::Edit);
}

#[test]
fn keydown_during_the_grace_period_cancels_the_timer() {
    let mut h = composing(&[("b1", "")], "b1", 0);
    h.type_into("b1", 0, "ñ", 1);
    let task = scheduled(&h.send(Event::CompositionEnd));

    let effects = h.send(Event::KeyDown {
        key: Key::from("a"),
        is_composing: true,
    });
    assert_eq!(effects[0], Effect::CancelResolve(task));
    assert_eq!(h.text(), "ñ");
    assert!(h.send(Event::ResolveTimer(task)).is_empty());
}

#[test]
fn navigation_keys_are_suppressed_while_composing() {
    let mut h = composing(&[("b1", "abc")], "b1", 3);
    for key in [Key::ArrowLeft, Key::ArrowDown, Key::Enter] {
        let effects = h.send(Event::KeyDown {
            key,
            is_composing: true,
        });
        assert_eq!(effects, vec![Effect::PreventDefault]);
    }
    let effects = h.send(Event::KeyDown {
        key: Key::from("k"),
        is_composing: true,
    });
    assert!(effects.is_empty());
    assert_eq!(h.surface.composition_phase(), CompositionPhase::Composing);
}

#[test]
fn other_events_wait_for_the_composition() {
    let mut h = composing(&[("b1", "abc")], "b1", 3);
    h.type_into("b1", 0, "abcd", 4);
    assert!(h.send(Event::Input { input_type: None }).is_empty());
    assert!(h.send(Event::SelectionChange).is_empty());
    assert_eq!(h.text(), "abc");
}
