//! Browser integration tests. Run with `wasm-pack test --headless --chrome
//! -- --features csr`; the host test run skips this file entirely.
#![cfg(target_arch = "wasm32")]

use std::cell::Cell;
use std::rc::Rc;

use leptos::*;
use leptos_lazy_image::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

// 1x1 transparent GIF; loads without touching the network.
const TINY_GIF: &str =
    "data:image/gif;base64,R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";

fn mount(children: impl FnOnce() -> View + 'static) -> web_sys::Element {
    let document = web_sys::window().unwrap().document().unwrap();
    let host = document.create_element("div").unwrap();
    document.body().unwrap().append_child(&host).unwrap();
    leptos::mount_to(host.clone().unchecked_into(), children);
    host
}

async fn delay(ms: i32) {
    let promise = js_sys::Promise::new(&mut |resolve, _| {
        web_sys::window()
            .unwrap()
            .set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, ms)
            .unwrap();
    });
    wasm_bindgen_futures::JsFuture::from(promise).await.unwrap();
}

async fn wait_until(mut pred: impl FnMut() -> bool, timeout_ms: u32) -> bool {
    let mut elapsed = 0;
    while elapsed <= timeout_ms {
        if pred() {
            return true;
        }
        delay(25).await;
        elapsed += 25;
    }
    pred()
}

#[wasm_bindgen_test]
async fn priority_image_is_requested_eagerly() {
    let host = mount(|| {
        view! { <LazyImage src="test.jpg" alt="t" priority=true/> }.into_view()
    });
    delay(0).await;

    let img = host.query_selector("img").unwrap().expect("img mounted");
    assert_eq!(img.get_attribute("src").as_deref(), Some("test.jpg"));
    assert_eq!(img.get_attribute("loading").as_deref(), Some("eager"));
    assert_eq!(img.get_attribute("fetchpriority").as_deref(), Some("high"));
}

#[wasm_bindgen_test]
async fn offscreen_image_stays_unrequested() {
    let host = mount(|| view! { <LazyImage src="test.jpg" alt="t"/> }.into_view());
    host.set_attribute("style", "position:absolute;top:-10000px;left:-10000px;")
        .unwrap();
    delay(100).await;

    assert!(host.query_selector("img").unwrap().is_none());
}

#[wasm_bindgen_test]
async fn blurhash_placeholder_wins_over_lqip() {
    let host = mount(|| {
        view! {
            <LazyImage
                src="test.jpg"
                alt="t"
                blurhash="LEHV6nWB2yk8pyo0adR*.7kCMdnj"
                lqip="lqip.jpg"
                priority=true
            />
        }
        .into_view()
    });
    delay(0).await;

    assert!(host.query_selector("canvas").unwrap().is_some());
    assert!(host
        .query_selector("img[src='lqip.jpg']")
        .unwrap()
        .is_none());
}

#[wasm_bindgen_test]
async fn style_registration_is_idempotent() {
    ensure_styles();
    ensure_styles();
    mount(|| view! { <LazyImage src="test.jpg" alt="t" priority=true/> }.into_view());
    delay(0).await;

    let document = web_sys::window().unwrap().document().unwrap();
    let sheets = document
        .query_selector_all("#leptos-lazy-image-style")
        .unwrap();
    assert_eq!(sheets.length(), 1);
}

#[wasm_bindgen_test]
async fn successful_load_notifies_exactly_once() {
    let loads = Rc::new(Cell::new(0u32));
    let counted = loads.clone();
    let host = mount(move || {
        view! {
            <LazyImage
                src=TINY_GIF
                alt="t"
                priority=true
                on_load=Callback::new(move |()| counted.set(counted.get() + 1))
            />
        }
        .into_view()
    });

    assert!(wait_until(|| loads.get() == 1, 2000).await);
    delay(100).await;
    assert_eq!(loads.get(), 1);
    // Placeholderless load leaves only the image itself.
    assert!(host.query_selector("canvas").unwrap().is_none());
}

#[wasm_bindgen_test]
async fn terminal_error_renders_fallback_once() {
    let errors = Rc::new(Cell::new(0u32));
    let counted = errors.clone();
    let host = mount(move || {
        view! {
            <LazyImage
                src="/missing-asset-404.png"
                alt="t"
                priority=true
                fallback=|| view! { <span>"nothing here"</span> }.into_view()
                on_error=Callback::new(move |()| counted.set(counted.get() + 1))
            />
        }
        .into_view()
    });

    assert!(
        wait_until(
            || host.text_content().unwrap_or_default().contains("nothing here"),
            3000,
        )
        .await
    );
    assert_eq!(errors.get(), 1);
    assert!(host.query_selector("img").unwrap().is_none());
}

#[wasm_bindgen_test]
async fn transient_failures_are_absorbed_before_terminal() {
    let errors = Rc::new(Cell::new(0u32));
    let counted = errors.clone();
    let host = mount(move || {
        view! {
            <LazyImage
                src="/missing-asset-404.png"
                alt="t"
                priority=true
                retry_attempts=2
                retry_delay=10
                on_error=Callback::new(move |()| counted.set(counted.get() + 1))
            />
        }
        .into_view()
    });

    // Two retries absorbed silently, third failure is terminal.
    assert!(
        wait_until(
            || host
                .text_content()
                .unwrap_or_default()
                .contains("Image failed to load."),
            5000,
        )
        .await
    );
    assert_eq!(errors.get(), 1);
}

#[wasm_bindgen_test]
async fn picture_renders_source_candidates() {
    let host = mount(|| {
        view! {
            <LazyPicture
                src="test.jpg"
                alt="t"
                src_set="test-small.jpg 480w, test-large.jpg 800w"
                sizes="(max-width: 600px) 480px, 800px"
                priority=true
            />
        }
        .into_view()
    });
    delay(0).await;

    let source = host.query_selector("source").unwrap().expect("source tag");
    assert_eq!(
        source.get_attribute("srcset").as_deref(),
        Some("test-small.jpg 480w, test-large.jpg 800w")
    );
    assert_eq!(
        source.get_attribute("sizes").as_deref(),
        Some("(max-width: 600px) 480px, 800px")
    );
    assert!(host.query_selector("picture img").unwrap().is_some());
}

#[wasm_bindgen_test]
async fn unmount_during_retry_delay_cancels_retry() {
    let errors = Rc::new(Cell::new(0u32));
    let counted = errors.clone();
    let toggle: Rc<Cell<Option<WriteSignal<bool>>>> = Rc::new(Cell::new(None));
    let toggle_out = toggle.clone();
    let host = mount(move || {
        let (shown, set_shown) = create_signal(true);
        toggle_out.set(Some(set_shown));
        (move || {
            let counted = counted.clone();
            shown.get().then(move || {
                view! {
                    <LazyImage
                        src="/missing-asset-404.png"
                        alt="t"
                        priority=true
                        retry_attempts=1
                        retry_delay=200
                        on_error=Callback::new(move |()| counted.set(counted.get() + 1))
                    />
                }
            })
        })
        .into_view()
    });
    delay(0).await;

    // Report a failure so a retry is pending, then unmount before the delay
    // elapses. The timer must be cleared: nothing re-renders, nothing blows up.
    let img = host.query_selector("img").unwrap().expect("img mounted");
    let event = web_sys::Event::new("error").unwrap();
    img.dispatch_event(&event).unwrap();
    toggle.get().expect("toggle captured").set(false);

    delay(500).await;
    assert_eq!(errors.get(), 0);
    assert_eq!(host.child_element_count(), 0);
}

#[wasm_bindgen_test]
async fn picture_load_event_settles_without_duplicate_notification() {
    let loads = Rc::new(Cell::new(0u32));
    let counted = loads.clone();
    mount(move || {
        view! {
            <LazyPicture
                src=TINY_GIF
                alt="t"
                priority=true
                on_load=Callback::new(move |()| counted.set(counted.get() + 1))
            />
        }
        .into_view()
    });

    assert!(wait_until(|| loads.get() == 1, 2000).await);
    // The load event stops the completeness poll; several poll intervals later
    // the callback count is untouched.
    delay(400).await;
    assert_eq!(loads.get(), 1);
}

#[wasm_bindgen_test]
async fn retry_rewrites_every_srcset_candidate() {
    let host = mount(|| {
        view! {
            <LazyPicture
                src="/missing-asset-404.png"
                alt="t"
                src_set="/missing-asset-404.png 1x"
                priority=true
                retry_attempts=2
                retry_delay=50
            />
        }
        .into_view()
    });
    delay(0).await;

    let img = host.query_selector("img").unwrap().expect("img mounted");
    let event = web_sys::Event::new("error").unwrap();
    img.dispatch_event(&event).unwrap();

    // The re-rendered source must carry the cache-busting token, not the
    // original candidate URLs.
    assert!(
        wait_until(
            || {
                host.query_selector("source")
                    .unwrap()
                    .and_then(|s| s.get_attribute("srcset"))
                    .map(|s| s.contains("_retry="))
                    .unwrap_or(false)
            },
            2000,
        )
        .await
    );
}
