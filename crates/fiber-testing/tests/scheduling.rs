use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fiber_core::{HostOp, IdleScheduler, MemoryHost, Reconciler};
use fiber_runtime_std::IdleDriver;
use fiber_testing::prelude::*;

type Slot = Rc<RefCell<Option<SetState<i32>>>>;

fn list(items: usize) -> Element {
    create_element(
        "ul",
        Props::new(),
        (0..items).map(|index| {
            Child::from(create_element("li", Props::new().with("data-index", index), []))
        }),
    )
}

/// Component that renders its count and publishes its latest setter.
fn counter(slot: &Slot) -> Component {
    let slot = Rc::clone(slot);
    component(move |_props: &Props| {
        let (count, set) = use_state(0)?;
        *slot.borrow_mut() = Some(set);
        Ok(create_element("b", Props::new(), children![count]))
    })
}

/// Like [`counter`], but only equal to its own clones.
fn distinct_counter(slot: &Slot) -> Component {
    let slot = Rc::clone(slot);
    Component::distinct(move |_props: &Props| {
        let (count, set) = use_state(0)?;
        *slot.borrow_mut() = Some(set);
        Ok(create_element("b", Props::new(), children![count]))
    })
}

fn set(slot: &Slot, value: i32) {
    slot.borrow().as_ref().expect("counter never rendered").set(value);
}

fn pair(left: &Component, right: &Component) -> Element {
    create_element(
        "div",
        Props::new(),
        children![
            create_element(left.clone(), Props::new(), []),
            create_element(right.clone(), Props::new(), []),
        ],
    )
}

#[test]
fn interrupted_render_touches_nothing_attached_until_commit() {
    run_test_render(|rule| {
        rule.schedule(list(4));
        let mut yields = 0;
        loop {
            match rule.step(1).unwrap() {
                WorkStatus::Yielded => {
                    yields += 1;
                    assert!(rule.root_nodes().is_empty());
                    assert!(rule
                        .take_ops()
                        .iter()
                        .all(|op| !matches!(op, HostOp::AppendChild { .. })));
                }
                WorkStatus::Committed => break,
                WorkStatus::Idle => panic!("render finished without committing"),
            }
        }
        // root, ul and four items; the last unit commits in the same slice
        assert_eq!(yields, 5);
        assert_eq!(rule.root_nodes().len(), 1);
        assert_eq!(rule.host().children(rule.find_one("ul").unwrap()).len(), 4);
    });
}

#[test]
fn superseded_generation_is_abandoned() {
    run_test_render(|rule| {
        rule.set_content(list(2)).unwrap();
        let ul = rule.find_one("ul").unwrap();
        rule.take_ops();

        rule.schedule(create_element(
            "section",
            Props::new(),
            children![create_element("h2", Props::new(), [])],
        ));
        assert_eq!(rule.step(2).unwrap(), WorkStatus::Yielded);
        assert_eq!(rule.reconciler().pending_deletions().len(), 1);
        let section = rule
            .take_ops()
            .into_iter()
            .find_map(|op| match op {
                HostOp::CreateElement { node, tag } if tag == "section" => Some(node),
                _ => None,
            })
            .expect("section node is created while building");

        rule.schedule(list(2));
        assert!(rule.reconciler().pending_deletions().is_empty());
        rule.settle().unwrap();

        assert_eq!(rule.find_one("ul"), Some(ul));
        assert!(rule.find_by_tag("section").is_empty());
        assert_eq!(rule.host().node(section).unwrap().parent(), None);
        assert!(rule
            .take_ops()
            .iter()
            .all(|op| !matches!(op, HostOp::RemoveChild { .. } | HostOp::AppendChild { .. })));
        assert_eq!(rule.reconciler().generation(), 3);
    });
}

#[derive(Default)]
struct CountingScheduler(AtomicUsize);

impl IdleScheduler for CountingScheduler {
    fn request_idle_callback(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn every_work_loop_asks_for_more_idle_time() {
    let scheduler = Arc::new(CountingScheduler::default());
    let mut host = MemoryHost::new();
    let container = host.create_container("root");
    let mut reconciler = Reconciler::new(host, Arc::clone(&scheduler) as Arc<dyn IdleScheduler>);
    let requests = || scheduler.0.load(Ordering::SeqCst);

    reconciler.render(list(2), container);
    assert_eq!(requests(), 1);

    assert_eq!(reconciler.work_loop(&UnitBudget::new(1)).unwrap(), WorkStatus::Yielded);
    assert_eq!(requests(), 2);

    reconciler.flush().unwrap();
    let settled = requests();
    assert_eq!(reconciler.work_loop(&UnitBudget::new(1)).unwrap(), WorkStatus::Idle);
    assert_eq!(requests(), settled + 1);
}

#[test]
fn sibling_updates_coalesce_into_one_generation() {
    let (left_slot, right_slot) = (Slot::default(), Slot::default());
    let (left, right) = (counter(&left_slot), counter(&right_slot));

    run_test_render(|rule| {
        rule.set_content(pair(&left, &right)).unwrap();
        let root = rule.reconciler().current_root();
        assert_eq!(rule.text(), "00");

        set(&left_slot, 1);
        set(&left_slot, 3);
        set(&right_slot, 2);
        assert!(rule.runtime_handle().has_pending_updates());
        rule.settle().unwrap();

        assert_eq!(rule.text(), "32");
        assert_eq!(rule.reconciler().generation(), 2);
        assert_eq!(rule.reconciler().current_root(), root);
    });
}

#[test]
fn repeated_updates_do_not_grow_the_fiber_arena() {
    let (left_slot, right_slot) = (Slot::default(), Slot::default());
    let (left, right) = (counter(&left_slot), counter(&right_slot));

    run_test_render(|rule| {
        rule.set_content(pair(&left, &right)).unwrap();
        // root, div, two components with a <b> and a text each
        assert_eq!(rule.reconciler().fiber_count(), 8);
        for value in 1..=5 {
            set(&left_slot, value);
            rule.settle().unwrap();
            set(&right_slot, value * 10);
            rule.settle().unwrap();
            assert_eq!(rule.reconciler().fiber_count(), 8);
        }
        assert_eq!(rule.text(), "550");

        rule.rerender().unwrap();
        assert_eq!(rule.reconciler().fiber_count(), 8);
    });
}

#[test]
fn updates_from_unmounted_components_are_dropped() {
    let slot = Slot::default();
    let child = counter(&slot);

    run_test_render(|rule| {
        rule.set_content(create_element(child, Props::new(), [])).unwrap();
        rule.set_content(create_element("p", Props::new(), children!["gone"]))
            .unwrap();
        assert_eq!(rule.reconciler().generation(), 2);

        set(&slot, 5);
        assert!(rule.reconciler().has_pending_work());
        rule.settle().unwrap();

        assert_eq!(rule.reconciler().generation(), 2);
        assert_eq!(rule.text(), "gone");
        assert!(!rule.reconciler().has_pending_work());
    });
}

#[test]
fn update_during_a_subtree_render_widens_the_generation() {
    let (left_slot, right_slot) = (Slot::default(), Slot::default());
    let (left, right) = (counter(&left_slot), counter(&right_slot));

    run_test_render(|rule| {
        rule.set_content(pair(&left, &right)).unwrap();

        set(&left_slot, 1);
        assert_eq!(rule.step(1).unwrap(), WorkStatus::Yielded);
        let origin = rule.reconciler().wip_root().unwrap();
        assert!(rule.reconciler().fiber(origin).unwrap().kind().is_component());

        set(&right_slot, 2);
        rule.settle().unwrap();

        assert_eq!(rule.text(), "12");
        assert_eq!(rule.reconciler().generation(), 3);
        assert_eq!(rule.reconciler().fiber_count(), 8);
    });
}

#[test]
fn idle_driver_slices_by_the_clock() {
    let clock = ManualClock::auto_advancing(Duration::from_millis(1));
    let driver = IdleDriver::with_clock(clock, Duration::from_millis(3));

    run_test_render(|rule| {
        rule.schedule(list(4));
        // three units fit in each 3ms slice: root, ul, li | li, li, li
        assert_eq!(driver.run_until_idle(rule.reconciler_mut()).unwrap(), 2);
        assert_eq!(rule.host().children(rule.find_one("ul").unwrap()).len(), 4);
    });
}

#[test]
fn swapping_distinct_components_remounts_both() {
    let (left_slot, right_slot) = (Slot::default(), Slot::default());
    let (left, right) = (distinct_counter(&left_slot), distinct_counter(&right_slot));

    run_test_render(|rule| {
        rule.set_content(pair(&left, &right)).unwrap();
        set(&left_slot, 5);
        rule.settle().unwrap();
        assert_eq!(rule.text(), "50");
        let first = rule.find_by_tag("b")[0];

        rule.set_content(pair(&right, &left)).unwrap();
        assert_eq!(rule.text(), "00");
        assert_eq!(rule.host().node(first).unwrap().parent(), None);

        set(&right_slot, 3);
        rule.settle().unwrap();
        assert_eq!(rule.text(), "30");
    });
}

#[test]
fn factory_components_share_identity_across_a_swap() {
    let (left_slot, right_slot) = (Slot::default(), Slot::default());
    let (left, right) = (counter(&left_slot), counter(&right_slot));

    run_test_render(|rule| {
        rule.set_content(pair(&left, &right)).unwrap();
        set(&left_slot, 5);
        rule.settle().unwrap();
        let first = rule.find_by_tag("b")[0];

        rule.set_content(pair(&right, &left)).unwrap();
        assert_eq!(rule.text(), "50");
        assert_eq!(rule.find_by_tag("b")[0], first);
    });
}
