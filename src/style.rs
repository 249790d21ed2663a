use std::cell::Cell;

/**
 * Visual defaults and inline-style builders shared by both components.
 */

pub const STYLE_ID: &str = "leptos-lazy-image-style";

pub const WRAPPER_CLASS: &str = "lazy-image-wrapper";
pub const ITEM_CLASS: &str = "lazy-image-item";
pub const PLACEHOLDER_CLASS: &str = "lazy-image-placeholder";
pub const FALLBACK_CLASS: &str = "lazy-image-fallback";

// Wrapper stacks placeholder and image in the same grid cell so they can
// cross-fade without layout shift.
const STYLESHEET: &str = "\
.lazy-image-wrapper {\
  position: relative;\
  overflow: hidden;\
  display: grid;\
  grid-template-areas: 'stack';\
  place-items: center;\
}\
.lazy-image-item {\
  grid-area: stack;\
  width: 100%;\
  height: 100%;\
  object-fit: cover;\
}\
.lazy-image-placeholder {\
  filter: blur(1rem);\
  pointer-events: none;\
}\
.lazy-image-fallback {\
  display: flex;\
  align-items: center;\
  justify-content: center;\
  width: 100%;\
  height: 100%;\
  background: #f3f4f6;\
  color: #6b7280;\
  font-size: 0.875rem;\
}";

thread_local! {
    static REGISTERED: Cell<bool> = const { Cell::new(false) };
}

/// Register the component stylesheet in the document head, keyed by
/// [`STYLE_ID`]. Idempotent across any number of component instances, and a
/// no-op when no document exists.
pub fn ensure_styles() {
    if REGISTERED.with(Cell::get) {
        return;
    }
    let Some(document) = web_sys::window().and_then(|window| window.document()) else {
        return;
    };
    if document.get_element_by_id(STYLE_ID).is_some() {
        REGISTERED.with(|registered| registered.set(true));
        return;
    }
    match document.create_element("style") {
        Ok(style) => {
            style.set_id(STYLE_ID);
            style.set_text_content(Some(STYLESHEET));
            if let Some(head) = document.head() {
                if head.append_child(&style).is_ok() {
                    REGISTERED.with(|registered| registered.set(true));
                }
            }
        }
        Err(err) => log::warn!("failed to register lazy-image styles: {err:?}"),
    }
}

/// Inline style for the wrapper element. Layout pass-through only.
pub fn container_style(
    width: Option<&str>,
    height: Option<&str>,
    aspect_ratio: Option<f64>,
    style: &str,
) -> String {
    let mut out = String::new();
    if let Some(width) = width {
        out.push_str(&format!("width:{width};"));
    }
    if let Some(height) = height {
        out.push_str(&format!("height:{height};"));
    }
    if let Some(ratio) = aspect_ratio {
        out.push_str(&format!("aspect-ratio:{ratio};"));
    }
    out.push_str(style);
    out
}

/// Opacity/transition style for the fade-in treatment. A reduced-motion
/// preference drops the transition but keeps the content visible.
pub fn fade_style(fade_in: bool, duration_ms: u32, reduced_motion: bool, loaded: bool) -> String {
    if !fade_in {
        return "opacity:1;".to_string();
    }
    let opacity = if loaded { 1 } else { 0 };
    if reduced_motion {
        format!("opacity:{opacity};")
    } else {
        format!("opacity:{opacity};transition:opacity {duration_ms}ms ease-in-out;")
    }
}

pub fn prefers_reduced_motion() -> bool {
    web_sys::window()
        .and_then(|window| {
            window
                .match_media("(prefers-reduced-motion: reduce)")
                .ok()
                .flatten()
        })
        .map(|query| query.matches())
        .unwrap_or(false)
}

#[test]
fn test_container_style_composition() {
    assert_eq!(
        container_style(Some("100px"), Some("50px"), None, ""),
        "width:100px;height:50px;"
    );
    assert_eq!(
        container_style(None, None, Some(1.5), "background:red;"),
        "aspect-ratio:1.5;background:red;"
    );
    assert_eq!(container_style(None, None, None, ""), "");
}

#[test]
fn test_fade_style_states() {
    assert_eq!(fade_style(false, 300, false, false), "opacity:1;");
    assert_eq!(
        fade_style(true, 500, false, false),
        "opacity:0;transition:opacity 500ms ease-in-out;"
    );
    assert_eq!(
        fade_style(true, 300, false, true),
        "opacity:1;transition:opacity 300ms ease-in-out;"
    );
    // Reduced motion keeps the content, drops the transition.
    assert_eq!(fade_style(true, 300, true, true), "opacity:1;");
}
