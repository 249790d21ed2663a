use leptos::*;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

/// Options for [`use_in_view`].
#[derive(Clone, Debug)]
pub struct InViewOptions {
    /// CSS-margin string expanding the trigger region around the root.
    pub preload_margin: String,
    /// Fraction of the element that must be visible to trigger.
    pub threshold: f64,
    /// Stop observing after the first positive trigger.
    pub once: bool,
    /// Observation root; `None` means the viewport.
    pub root: Option<web_sys::Element>,
}

impl Default for InViewOptions {
    fn default() -> Self {
        Self {
            preload_margin: "200px".to_string(),
            threshold: 0.0,
            once: true,
            root: None,
        }
    }
}

/// Picked once per attach so each branch can be exercised on its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ObserveStrategy {
    /// `IntersectionObserver` is available.
    Observer,
    /// No observation primitive; treat the element as always visible rather
    /// than never loading.
    AlwaysVisible,
}

fn detect_strategy() -> ObserveStrategy {
    let supported = web_sys::window()
        .map(|window| {
            js_sys::Reflect::has(&window, &JsValue::from_str("IntersectionObserver"))
                .unwrap_or(false)
        })
        .unwrap_or(false);
    if supported {
        ObserveStrategy::Observer
    } else {
        ObserveStrategy::AlwaysVisible
    }
}

// The closure must outlive the observer, so both travel together.
struct ObserverHandle {
    observer: web_sys::IntersectionObserver,
    _callback: Closure<dyn FnMut(js_sys::Array, web_sys::IntersectionObserver)>,
}

/// Reports when the returned ref's element is within `preload_margin` of the
/// viewport. The observer lifecycle is fully managed: one observer per mount,
/// disconnected on first trigger when `once` is set, and on unmount on every
/// exit path.
///
/// ```ignore
/// let (container_ref, in_view) = use_in_view(InViewOptions::default());
/// view! { <div node_ref=container_ref>{move || in_view.get().then(expensive)}</div> }
/// ```
pub fn use_in_view(options: InViewOptions) -> (NodeRef<html::Div>, ReadSignal<bool>) {
    let element_ref = create_node_ref::<html::Div>();
    let (in_view, set_in_view) = create_signal(false);
    let handle: StoredValue<Option<ObserverHandle>> = store_value(None);
    let attached = store_value(false);

    let InViewOptions {
        preload_margin,
        threshold,
        once,
        root,
    } = options;

    create_effect(move |_| {
        let Some(element) = element_ref.get() else {
            return;
        };
        if attached.get_value() {
            return;
        }
        attached.set_value(true);

        match detect_strategy() {
            ObserveStrategy::AlwaysVisible => set_in_view.set(true),
            ObserveStrategy::Observer => {
                match observe(&element, &preload_margin, threshold, once, root.as_ref(), set_in_view) {
                    Ok(observing) => handle.set_value(Some(observing)),
                    Err(err) => {
                        log::warn!("failed to create intersection observer: {err:?}");
                        set_in_view.set(true);
                    }
                }
            }
        }
    });

    on_cleanup(move || {
        if let Some(observing) = handle.try_update_value(|h| h.take()).flatten() {
            observing.observer.disconnect();
        }
    });

    (element_ref, in_view)
}

fn observe(
    element: &web_sys::Element,
    margin: &str,
    threshold: f64,
    once: bool,
    root: Option<&web_sys::Element>,
    set_in_view: WriteSignal<bool>,
) -> Result<ObserverHandle, JsValue> {
    let callback = Closure::<dyn FnMut(js_sys::Array, web_sys::IntersectionObserver)>::new(
        move |entries: js_sys::Array, observer: web_sys::IntersectionObserver| {
            for entry in entries.iter() {
                let entry = entry.unchecked_into::<web_sys::IntersectionObserverEntry>();
                if entry.is_intersecting() {
                    set_in_view.set(true);
                    if once {
                        observer.disconnect();
                    }
                } else if !once {
                    set_in_view.set(false);
                }
            }
        },
    );

    let init = web_sys::IntersectionObserverInit::new();
    init.set_root_margin(margin);
    init.set_threshold(&JsValue::from_f64(threshold));
    init.set_root(root);

    let observer =
        web_sys::IntersectionObserver::new_with_options(callback.as_ref().unchecked_ref(), &init)?;
    observer.observe(element);

    Ok(ObserverHandle {
        observer,
        _callback: callback,
    })
}
