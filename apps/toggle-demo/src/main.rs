use std::time::Duration;

use anyhow::Context;
use fiber_core::{
    children, component, create_element, deps, use_effect, use_state, Cleanup, Element,
    MemoryHost, Props,
};
use fiber_runtime_std::{IdleDriver, StdRuntime};

fn app(_props: &Props) -> anyhow::Result<Element> {
    let (expanded, set_expanded) = use_state(true)?;

    use_effect(
        move || {
            log::info!("heading is now {}", if expanded { "h2" } else { "h3" });
            Cleanup::new(move || log::info!("leaving expanded = {expanded}"))
        },
        deps![expanded],
    )?;

    let detail = if expanded {
        create_element("h2", Props::new(), children!["2"])
    } else {
        create_element("h3", Props::new(), children!["3"])
    };
    Ok(create_element(
        "div",
        Props::new(),
        children![
            create_element("h1", Props::new(), children!["1"]),
            create_element(
                "p",
                Props::new().listener("onclick", move |_| set_expanded.set(false)),
                children![detail],
            ),
        ],
    ))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("=== Fiber toggle demo ===");
    println!("Renders a small tree, clicks the paragraph, and renders again.");
    println!();

    let runtime = StdRuntime::new();
    let mut host = MemoryHost::new();
    let container = host.create_container("root");
    let mut reconciler = runtime.reconciler(host);
    let driver = IdleDriver::new(Duration::from_millis(4));

    reconciler.render(create_element(component(app), Props::new(), []), container);
    let slices = driver.run_until_idle(&mut reconciler)?;
    println!("initial render ({slices} idle slices):");
    print!("{}", reconciler.host().dump_tree(container));

    let paragraph = reconciler
        .host()
        .find_by_tag(container, "p")
        .into_iter()
        .next()
        .context("paragraph was not rendered")?;
    let handled = reconciler.host().dispatch(paragraph, "click")?;
    log::debug!("click reached {handled} listener(s)");
    if runtime.take_idle_request() {
        let slices = driver.run_until_idle(&mut reconciler)?;
        println!();
        println!("after click ({slices} idle slices):");
        print!("{}", reconciler.host().dump_tree(container));
    }
    Ok(())
}
