use crate::load_state::{with_retry_token, AssetRequest, ErrorAction, LoadMachine};
use crate::placeholder::{
    choose_placeholder, BlurhashCanvas, PlaceholderChoice, PlaceholderImage, PlaceholderSpec,
};
use crate::style::{
    container_style, ensure_styles, fade_style, prefers_reduced_motion, FALLBACK_CLASS, ITEM_CLASS,
    PLACEHOLDER_CLASS, WRAPPER_CLASS,
};
use crate::use_in_view::{use_in_view, InViewOptions};

use leptos::leptos_dom::helpers::{set_timeout_with_handle, TimeoutHandle};
use leptos::*;
use leptos_meta::Link;
use std::time::Duration;

/**
 * Lazily loading image component for a single raster source.
 *
 * The image is requested once its container scrolls within `preload_margin`
 * of the viewport (or immediately with `priority`/`force_visible`). While the
 * request is pending, at most one placeholder tier is shown: blurhash canvas,
 * then LQIP, then the generic placeholder. Failed loads are retried up to
 * `retry_attempts` times before the fallback slot is rendered.
 */
#[component]
pub fn LazyImage(
    /// Canonical asset source; identity key for load state.
    #[prop(into)]
    src: MaybeSignal<String>,
    #[prop(into, optional)] alt: String,
    /// Blurhash string decoded into a canvas placeholder.
    #[prop(into, optional)]
    blurhash: Option<String>,
    /// Low-quality image placeholder, shown when no blurhash is usable.
    #[prop(into, optional)]
    lqip: Option<String>,
    /// Generic placeholder image, the last placeholder tier.
    #[prop(into, optional)]
    placeholder: Option<String>,
    #[prop(default = true)] fade_in: bool,
    #[prop(default = 300)] fade_in_duration: u32,
    /// Bypass visibility gating, preload the asset and hint high fetch urgency.
    #[prop(default = false)]
    priority: bool,
    /// Bypass visibility gating without the urgency hint.
    #[prop(default = false)]
    force_visible: bool,
    #[prop(into, default = String::from("200px"))] preload_margin: String,
    /// Transient failures absorbed before a failure becomes terminal.
    #[prop(default = 0)]
    retry_attempts: u32,
    #[prop(default = 1000)] retry_delay: u64,
    #[prop(optional)] aspect_ratio: Option<f64>,
    #[prop(into, optional)] width: Option<String>,
    #[prop(into, optional)] height: Option<String>,
    #[prop(into, optional)] class: String,
    #[prop(into, optional)] style: String,
    /// Rendered in place of the image on terminal error.
    #[prop(optional, into)]
    fallback: Option<ViewFn>,
    #[prop(optional, into)] on_load: Option<Callback<()>>,
    #[prop(optional, into)] on_error: Option<Callback<()>>,
) -> impl IntoView {
    ensure_styles();

    let (container_ref, in_view) = use_in_view(InViewOptions {
        preload_margin,
        ..Default::default()
    });

    let machine = store_value(LoadMachine::new(src.get_untracked(), retry_attempts));
    let request: RwSignal<Option<AssetRequest>> = create_rw_signal(None);
    let (loaded, set_loaded) = create_signal(false);
    let (failed, set_failed) = create_signal(false);
    let retry_timer: StoredValue<Option<TimeoutHandle>> = store_value(None);
    let reduced_motion = prefers_reduced_motion();

    let placeholder_choice = store_value(choose_placeholder(
        &PlaceholderSpec::for_image(blurhash, lqip, placeholder),
        false,
    ));

    let preload_href = priority.then(|| src.get_untracked());

    let clear_retry = move || {
        if let Some(timer) = retry_timer.try_update_value(|t| t.take()).flatten() {
            timer.clear();
        }
    };

    // A changed source invalidates everything recorded for the old one.
    let src_for_reset = src.clone();
    create_effect(move |prev: Option<String>| {
        let current = src_for_reset.get();
        if let Some(prev) = prev {
            if prev != current {
                clear_retry();
                machine.update_value(|m| {
                    m.rekey(current.clone());
                });
                set_loaded.set(false);
                set_failed.set(false);
                request.set(None);
            }
        }
        current
    });

    // Visibility gate. Re-runs when the observer fires and after a source reset.
    let src_for_gate = src.clone();
    create_effect(move |_| {
        let visible = priority || force_visible || in_view.get();
        if visible && request.with(Option::is_none) {
            machine.update_value(|m| m.request());
            let key = src_for_gate.get_untracked();
            request.set(Some(AssetRequest {
                url: key.clone(),
                key,
                src_set: None,
            }));
        }
    });

    on_cleanup(clear_retry);

    let schedule_retry = move |key: String| {
        let scheduled = set_timeout_with_handle(
            move || {
                let attempt = machine.try_update_value(|m| m.retry()).unwrap_or(0);
                let url = with_retry_token(&key, attempt);
                request.set(Some(AssetRequest {
                    key,
                    url,
                    src_set: None,
                }));
            },
            Duration::from_millis(retry_delay),
        );
        match scheduled {
            Ok(timer) => retry_timer.set_value(Some(timer)),
            Err(err) => log::warn!("failed to schedule image retry: {err:?}"),
        }
    };

    let placeholder_view = move || {
        if loaded.get() || failed.get() {
            return None;
        }
        let item_style = if fade_in { "opacity:0.8;" } else { "opacity:1;" };
        let item_class = format!("{ITEM_CLASS} {PLACEHOLDER_CLASS}");
        placeholder_choice.with_value(|choice| match choice {
            PlaceholderChoice::None => None,
            PlaceholderChoice::Canvas(decoded) => Some(
                view! { <BlurhashCanvas decoded=decoded.clone() class=item_class style=item_style/> }
                    .into_view(),
            ),
            PlaceholderChoice::Source(src) => Some(
                view! { <PlaceholderImage src=src.clone() class=item_class style=item_style/> }
                    .into_view(),
            ),
        })
    };

    let image_view = move || {
        if failed.get() {
            return None;
        }
        request.get().map(|AssetRequest { key, url, .. }| {
            let load_key = key.clone();
            let handle_load = move |_| {
                let accepted = machine
                    .try_update_value(|m| m.complete(&load_key))
                    .unwrap_or(false);
                if accepted {
                    clear_retry();
                    set_loaded.set(true);
                    if let Some(callback) = on_load {
                        callback.call(());
                    }
                }
            };
            let handle_error = move |_| {
                let action = machine.try_update_value(|m| m.fail(&key)).flatten();
                match action {
                    Some(ErrorAction::ScheduleRetry) => schedule_retry(key.clone()),
                    Some(ErrorAction::Terminal) => {
                        set_failed.set(true);
                        if let Some(callback) = on_error {
                            callback.call(());
                        }
                    }
                    None => {}
                }
            };
            view! {
                <img
                    src=url
                    alt=alt.clone()
                    class=ITEM_CLASS
                    style=move || fade_style(fade_in, fade_in_duration, reduced_motion, loaded.get())
                    loading=if priority { "eager" } else { "lazy" }
                    fetchpriority=if priority { "high" } else { "auto" }
                    on:load=handle_load
                    on:error=handle_error
                />
            }
        })
    };

    let fallback_view = move || {
        if !failed.get() {
            return None;
        }
        Some(match &fallback {
            Some(view_fn) => view_fn.run(),
            None => view! { <div class=FALLBACK_CLASS>"Image failed to load."</div> }.into_view(),
        })
    };

    let wrapper_class = if class.is_empty() {
        WRAPPER_CLASS.to_string()
    } else {
        format!("{WRAPPER_CLASS} {class}")
    };
    let wrapper_style = container_style(width.as_deref(), height.as_deref(), aspect_ratio, &style);

    view! {
        {preload_href.map(|href| view! { <Link rel="preload" as_="image" href=href/> })}
        <div node_ref=container_ref class=wrapper_class style=wrapper_style>
            {fallback_view}
            {placeholder_view}
            {image_view}
        </div>
    }
}
