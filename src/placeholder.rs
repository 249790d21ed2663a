use leptos::*;
use wasm_bindgen::{Clamped, JsCast, JsValue};

/**
 * Placeholder selection and rendering.
 *
 * Tier priority is fixed: decoded blurhash canvas, then LQIP, then the generic
 * placeholder image. A malformed blurhash falls through to the next tier
 * instead of surfacing an error.
 */

pub const DEFAULT_BLURHASH_RESOLUTION: u32 = 32;

#[derive(Debug, thiserror::Error)]
pub enum PlaceholderError {
    #[error("failed to decode blurhash: {0}")]
    Decode(String),
}

/// RGBA pixels for one decoded blurhash, ready to paint onto a canvas.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedBlurhash {
    pub pixels: Vec<u8>,
    pub resolution: u32,
}

/// The placeholder tiers a component instance was configured with.
#[derive(Clone, Debug, Default)]
pub struct PlaceholderSpec {
    blurhash: Option<String>,
    lqip: Option<String>,
    placeholder: Option<String>,
    placeholder_enabled: bool,
    resolution: u32,
}

impl PlaceholderSpec {
    pub fn for_image(
        blurhash: Option<String>,
        lqip: Option<String>,
        placeholder: Option<String>,
    ) -> Self {
        Self {
            blurhash,
            lqip,
            placeholder,
            placeholder_enabled: true,
            resolution: DEFAULT_BLURHASH_RESOLUTION,
        }
    }

    /// The picture variant shows the generic placeholder only when the caller
    /// opted in with `placeholder_blur`. Blurhash and LQIP stay ungated.
    pub fn for_picture(
        blurhash: Option<String>,
        lqip: Option<String>,
        placeholder: Option<String>,
        placeholder_blur: bool,
    ) -> Self {
        Self {
            blurhash,
            lqip,
            placeholder,
            placeholder_enabled: placeholder_blur,
            resolution: DEFAULT_BLURHASH_RESOLUTION,
        }
    }

    pub fn with_resolution(mut self, resolution: u32) -> Self {
        self.resolution = resolution;
        self
    }
}

/// What, if anything, occupies the asset's box while it has not loaded.
#[derive(Clone, Debug, PartialEq)]
pub enum PlaceholderChoice {
    None,
    Canvas(DecodedBlurhash),
    Source(String),
}

pub fn decode_blurhash(hash: &str, resolution: u32) -> Result<DecodedBlurhash, PlaceholderError> {
    let pixels = blurhash::decode(hash, resolution, resolution, 1.0)
        .map_err(|err| PlaceholderError::Decode(format!("{err:?}")))?;
    Ok(DecodedBlurhash { pixels, resolution })
}

/// Pick at most one placeholder for the current configuration.
pub fn choose_placeholder(spec: &PlaceholderSpec, loaded: bool) -> PlaceholderChoice {
    if loaded {
        return PlaceholderChoice::None;
    }
    if let Some(hash) = &spec.blurhash {
        match decode_blurhash(hash, spec.resolution) {
            Ok(decoded) => return PlaceholderChoice::Canvas(decoded),
            Err(err) => log::warn!("{err}; falling back to next placeholder tier"),
        }
    }
    if let Some(lqip) = &spec.lqip {
        return PlaceholderChoice::Source(lqip.clone());
    }
    match &spec.placeholder {
        Some(src) if spec.placeholder_enabled => PlaceholderChoice::Source(src.clone()),
        _ => PlaceholderChoice::None,
    }
}

fn paint(canvas: &web_sys::HtmlCanvasElement, decoded: &DecodedBlurhash) -> Result<(), JsValue> {
    let resolution = decoded.resolution;
    canvas.set_width(resolution);
    canvas.set_height(resolution);
    let context = canvas
        .get_context("2d")?
        .ok_or_else(|| JsValue::from_str("2d canvas context unavailable"))?
        .dyn_into::<web_sys::CanvasRenderingContext2d>()?;
    let data = web_sys::ImageData::new_with_u8_clamped_array_and_sh(
        Clamped(&decoded.pixels),
        resolution,
        resolution,
    )?;
    context.put_image_data(&data, 0.0, 0.0)
}

/// Canvas painted with a decoded blurhash, scaled by CSS to fill the box.
#[component]
pub fn BlurhashCanvas(
    decoded: DecodedBlurhash,
    #[prop(into, optional)] class: String,
    #[prop(into, optional)] style: String,
) -> impl IntoView {
    let canvas_ref = create_node_ref::<html::Canvas>();
    let resolution = decoded.resolution;
    let decoded = store_value(decoded);
    let painted = store_value(false);

    create_effect(move |_| {
        let Some(canvas) = canvas_ref.get() else {
            return;
        };
        if painted.get_value() {
            return;
        }
        painted.set_value(true);
        if let Err(err) = decoded.with_value(|d| paint(&canvas, d)) {
            log::warn!("failed to draw blurhash canvas: {err:?}");
        }
    });

    on_cleanup(move || {
        // Zeroing the dimensions releases the pixel buffer eagerly.
        if let Some(canvas) = canvas_ref.get_untracked() {
            canvas.set_width(0);
            canvas.set_height(0);
        }
    });

    view! {
        <canvas
            node_ref=canvas_ref
            width=resolution
            height=resolution
            aria-hidden="true"
            class=class
            style=style
        ></canvas>
    }
}

/// LQIP or generic placeholder image.
#[component]
pub fn PlaceholderImage(
    #[prop(into)] src: String,
    #[prop(into, optional)] class: String,
    #[prop(into, optional)] style: String,
) -> impl IntoView {
    view! { <img src=src alt="" aria-hidden="true" class=class style=style/> }
}

#[cfg(test)]
const VALID_HASH: &str = "LEHV6nWB2yk8pyo0adR*.7kCMdnj";

#[test]
fn test_valid_hash_decodes_to_rgba_buffer() {
    let decoded = decode_blurhash(VALID_HASH, 32).unwrap();
    assert_eq!(decoded.pixels.len(), 32 * 32 * 4);
    assert_eq!(decoded.resolution, 32);
}

#[test]
fn test_blurhash_wins_over_other_tiers() {
    let spec = PlaceholderSpec::for_image(
        Some(VALID_HASH.to_string()),
        Some("lqip.jpg".to_string()),
        Some("placeholder.jpg".to_string()),
    );
    assert!(matches!(
        choose_placeholder(&spec, false),
        PlaceholderChoice::Canvas(_)
    ));
}

#[test]
fn test_malformed_hash_falls_through_to_lqip() {
    let spec = PlaceholderSpec::for_image(
        Some("L00".to_string()),
        Some("lqip.jpg".to_string()),
        Some("placeholder.jpg".to_string()),
    );
    assert_eq!(
        choose_placeholder(&spec, false),
        PlaceholderChoice::Source("lqip.jpg".to_string())
    );
}

#[test]
fn test_truncated_hash_falls_through_to_placeholder() {
    let truncated = &VALID_HASH[..VALID_HASH.len() - 1];
    let spec = PlaceholderSpec::for_image(Some(truncated.to_string()), None, Some("p.jpg".into()));
    assert_eq!(
        choose_placeholder(&spec, false),
        PlaceholderChoice::Source("p.jpg".to_string())
    );
}

#[test]
fn test_lqip_wins_over_generic_placeholder() {
    let spec = PlaceholderSpec::for_image(None, Some("lqip.jpg".into()), Some("p.jpg".into()));
    assert_eq!(
        choose_placeholder(&spec, false),
        PlaceholderChoice::Source("lqip.jpg".to_string())
    );
}

#[test]
fn test_picture_gates_generic_placeholder_behind_blur_flag() {
    let gated = PlaceholderSpec::for_picture(None, None, Some("p.jpg".into()), false);
    assert_eq!(choose_placeholder(&gated, false), PlaceholderChoice::None);

    let opted_in = PlaceholderSpec::for_picture(None, None, Some("p.jpg".into()), true);
    assert_eq!(
        choose_placeholder(&opted_in, false),
        PlaceholderChoice::Source("p.jpg".to_string())
    );

    // LQIP is not gated.
    let lqip = PlaceholderSpec::for_picture(None, Some("lqip.jpg".into()), None, false);
    assert_eq!(
        choose_placeholder(&lqip, false),
        PlaceholderChoice::Source("lqip.jpg".to_string())
    );
}

#[test]
fn test_no_placeholder_once_loaded() {
    let spec = PlaceholderSpec::for_image(Some(VALID_HASH.to_string()), None, None);
    assert_eq!(choose_placeholder(&spec, true), PlaceholderChoice::None);
}
