use std::cell::RefCell;
use std::rc::Rc;

use fiber_core::{EffectTag, FiberId, HostOp, NodeId, Reconciler};
use fiber_testing::prelude::*;

fn page(title: &str, items: usize) -> Element {
    create_element(
        "main",
        Props::new().with("title", title),
        children![
            create_element("h1", Props::new(), children![title]),
            create_element(
                "ul",
                Props::new(),
                (0..items).map(|index| {
                    Child::from(create_element(
                        "li",
                        Props::new().with("data-index", index),
                        children![format!("item {index}")],
                    ))
                }),
            ),
        ],
    )
}

fn all_fibers<H: fiber_core::HostRenderer>(reconciler: &Reconciler<H>) -> Vec<FiberId> {
    let mut order = Vec::new();
    let mut stack: Vec<FiberId> = reconciler.current_root().into_iter().collect();
    while let Some(id) = stack.pop() {
        order.push(id);
        stack.extend(reconciler.fiber_children(id).into_iter().rev());
    }
    order
}

fn list_items(rule: &RenderTestRule) -> Vec<NodeId> {
    let list = rule.find_one("ul").unwrap();
    rule.host().children(list).to_vec()
}

#[test]
fn identical_render_is_all_updates_and_no_host_mutation() {
    run_test_render(|rule| {
        rule.set_content(page("inbox", 3)).unwrap();
        let before = rule.dump_tree();
        rule.take_ops();

        rule.set_content(page("inbox", 3)).unwrap();
        assert!(rule.take_ops().is_empty());
        assert_eq!(rule.dump_tree(), before);

        let reconciler = rule.reconciler();
        let fibers = all_fibers(reconciler);
        // root + main + h1 + text + ul + 3 * (li + text)
        assert_eq!(fibers.len(), 11);
        for id in &fibers[1..] {
            assert_eq!(reconciler.fiber(*id).unwrap().tag(), EffectTag::Update);
        }
        assert_eq!(reconciler.fiber_count(), fibers.len());
    });
}

#[test]
fn growing_and_shrinking_children_is_symmetric() {
    run_test_render(|rule| {
        rule.set_content(page("inbox", 3)).unwrap();
        let original = list_items(rule);
        let live = rule.reconciler().fiber_count();

        rule.take_ops();
        rule.set_content(page("inbox", 1)).unwrap();
        let removed = rule
            .take_ops()
            .into_iter()
            .filter(|op| matches!(op, HostOp::RemoveChild { .. }))
            .count();
        assert_eq!(removed, 2);
        assert_eq!(list_items(rule), original[..1].to_vec());
        assert!(rule.reconciler().pending_deletions().is_empty());

        rule.set_content(page("inbox", 3)).unwrap();
        let items = list_items(rule);
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], original[0]);
        assert!(!items.contains(&original[1]));
        assert_eq!(rule.text(), "inboxitem 0item 1item 2");
        assert_eq!(rule.reconciler().fiber_count(), live);
    });
}

#[test]
fn attributes_follow_the_latest_props() {
    run_test_render(|rule| {
        rule.set_content(page("inbox", 0)).unwrap();
        let main = rule.find_one("main").unwrap();
        rule.take_ops();

        rule.set_content(page("archive", 0)).unwrap();
        let text = rule.host().children(rule.find_one("h1").unwrap())[0];
        assert_eq!(
            rule.take_ops(),
            vec![
                HostOp::SetAttribute {
                    node: main,
                    name: "title".into()
                },
                HostOp::SetAttribute {
                    node: text,
                    name: "nodeValue".into()
                },
            ]
        );

        rule.set_content(create_element("main", Props::new(), [])).unwrap();
        let node = rule.host().node(main).unwrap();
        assert!(node.attribute("title").is_none());
        assert!(node.children().is_empty());
    });
}

#[test]
fn kind_change_tears_down_and_recreates() {
    run_test_render(|rule| {
        rule.set_content(create_element(
            "div",
            Props::new(),
            children![create_element("span", Props::new(), children!["a"])],
        ))
        .unwrap();
        let span = rule.find_one("span").unwrap();

        rule.set_content(create_element(
            "div",
            Props::new(),
            children![create_element("b", Props::new(), children!["a"])],
        ))
        .unwrap();
        assert!(rule.find_by_tag("span").is_empty());
        assert_eq!(rule.host().node(span).unwrap().parent(), None);
        assert_eq!(rule.find_by_tag("b").len(), 1);
        assert_eq!(rule.text(), "a");
    });
}

#[test]
fn placements_append_after_surviving_siblings() {
    run_test_render(|rule| {
        let row = |first: &str| {
            create_element(
                "div",
                Props::new(),
                children![
                    create_element(first, Props::new(), []),
                    create_element("em", Props::new(), []),
                ],
            )
        };
        rule.set_content(row("i")).unwrap();
        rule.set_content(row("b")).unwrap();

        let div = rule.find_one("div").unwrap();
        let tags: Vec<String> = rule
            .host()
            .children(div)
            .iter()
            .filter_map(|id| rule.host().node(*id)?.tag().map(str::to_owned))
            .collect();
        assert_eq!(tags, vec!["em".to_owned(), "b".to_owned()]);
    });
}

#[test]
fn changed_handlers_are_rebound() {
    run_test_render(|rule| {
        let clicks = Rc::new(RefCell::new(Vec::new()));
        let button = |label: &'static str| {
            let clicks = Rc::clone(&clicks);
            create_element(
                "button",
                Props::new().listener("onClick", move |event| {
                    clicks.borrow_mut().push(format!("{label}:{}", event.name))
                }),
                children![label],
            )
        };

        rule.set_content(button("first")).unwrap();
        let node = rule.find_one("button").unwrap();
        rule.click(node).unwrap();

        rule.set_content(button("second")).unwrap();
        assert_eq!(rule.find_one("button"), Some(node));
        assert_eq!(rule.click(node), Ok(1));
        assert_eq!(*clicks.borrow(), vec!["first:click", "second:click"]);

        rule.set_content(create_element("button", Props::new(), children!["second"]))
            .unwrap();
        assert_eq!(rule.click(node), Ok(0));
        assert_eq!(clicks.borrow().len(), 2);
    });
}

#[test]
fn custom_event_prefix_changes_what_counts_as_a_listener() {
    let mut rule = RenderTestRule::with_config(
        fiber_core::ReconcilerConfig::new().event_prefix("handle"),
    );
    rule.set_content(create_element(
        "input",
        Props::new()
            .listener("handleInput", |_| {})
            .with("onclick", "plain"),
        [],
    ))
    .unwrap();
    let input = rule.find_one("input").unwrap();
    let node = rule.host().node(input).unwrap();
    assert_eq!(node.listener_count("input"), 1);
    assert_eq!(node.attribute("onclick"), Some(&"plain".into()));
}
