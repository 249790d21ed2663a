use crate::load_state::{
    composite_key, with_retry_token, with_retry_token_srcset, AssetRequest, ErrorAction,
    LoadMachine,
};
use crate::placeholder::{
    choose_placeholder, BlurhashCanvas, PlaceholderChoice, PlaceholderImage, PlaceholderSpec,
};
use crate::style::{
    container_style, ensure_styles, fade_style, prefers_reduced_motion, FALLBACK_CLASS, ITEM_CLASS,
    PLACEHOLDER_CLASS, WRAPPER_CLASS,
};
use crate::use_in_view::{use_in_view, InViewOptions};

use leptos::leptos_dom::helpers::{
    set_interval_with_handle, set_timeout_with_handle, IntervalHandle, TimeoutHandle,
};
use leptos::*;
use leptos_meta::Link;
use std::time::Duration;

// The browser only fires `load` on the active source-set candidate, so the
// native `complete` flag is polled for a bounded window as a second signal.
const COMPLETE_POLL_INTERVAL_MS: u64 = 100;
const COMPLETE_POLL_CEILING_MS: u64 = 5000;

/**
 * Lazily loading `<picture>` component for responsive delivery.
 *
 * Same visibility gating, placeholder tiers and retry policy as `LazyImage`,
 * generalized to a source-set + media-conditions construct. Load identity
 * spans `src`, `src_set` and `sizes`: a change to any one of them discards
 * stale loaded/errored state.
 */
#[component]
pub fn LazyPicture(
    /// Fallback source; part of the load identity key.
    #[prop(into)]
    src: MaybeSignal<String>,
    #[prop(into, optional)] alt: String,
    /// Responsive candidate list.
    #[prop(optional, into)]
    src_set: MaybeProp<String>,
    /// Media-condition selector for the candidates.
    #[prop(optional, into)]
    sizes: MaybeProp<String>,
    #[prop(into, optional)] blurhash: Option<String>,
    #[prop(into, optional)] lqip: Option<String>,
    #[prop(into, optional)] placeholder: Option<String>,
    /// The generic placeholder is only shown when this is set.
    #[prop(default = false)]
    placeholder_blur: bool,
    #[prop(default = true)] fade_in: bool,
    #[prop(default = 300)] fade_in_duration: u32,
    #[prop(default = false)] priority: bool,
    #[prop(default = false)] force_visible: bool,
    #[prop(into, default = String::from("200px"))] preload_margin: String,
    #[prop(default = 0)] retry_attempts: u32,
    #[prop(default = 1000)] retry_delay: u64,
    #[prop(optional)] aspect_ratio: Option<f64>,
    #[prop(into, optional)] width: Option<String>,
    #[prop(into, optional)] height: Option<String>,
    #[prop(into, optional)] class: String,
    #[prop(into, optional)] style: String,
    #[prop(optional, into)] fallback: Option<ViewFn>,
    #[prop(optional, into)] on_load: Option<Callback<()>>,
    #[prop(optional, into)] on_error: Option<Callback<()>>,
) -> impl IntoView {
    ensure_styles();

    let (container_ref, in_view) = use_in_view(InViewOptions {
        preload_margin,
        ..Default::default()
    });
    let img_ref = create_node_ref::<html::Img>();

    let identity = {
        let src = src.clone();
        let src_set = src_set.clone();
        let sizes = sizes.clone();
        move || composite_key(&src.get(), src_set.get().as_deref(), sizes.get().as_deref())
    };

    let machine = store_value(LoadMachine::new(identity(), retry_attempts));
    let request: RwSignal<Option<AssetRequest>> = create_rw_signal(None);
    let (loaded, set_loaded) = create_signal(false);
    let (failed, set_failed) = create_signal(false);
    let retry_timer: StoredValue<Option<TimeoutHandle>> = store_value(None);
    let poll_handles: StoredValue<Option<(IntervalHandle, TimeoutHandle)>> = store_value(None);
    let reduced_motion = prefers_reduced_motion();

    let placeholder_choice = store_value(choose_placeholder(
        &PlaceholderSpec::for_picture(blurhash, lqip, placeholder, placeholder_blur),
        false,
    ));

    let preload_href = priority.then(|| src.get_untracked());

    let clear_retry = move || {
        if let Some(timer) = retry_timer.try_update_value(|t| t.take()).flatten() {
            timer.clear();
        }
    };
    let stop_polling = move || {
        if let Some((interval, ceiling)) = poll_handles.try_update_value(|h| h.take()).flatten() {
            interval.clear();
            ceiling.clear();
        }
    };

    // Any of the three identity fields changing discards stale state.
    let identity_for_reset = identity.clone();
    create_effect(move |prev: Option<String>| {
        let current = identity_for_reset();
        if let Some(prev) = prev {
            if prev != current {
                clear_retry();
                stop_polling();
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

    // Visibility gate.
    let src_for_gate = src.clone();
    let src_set_for_gate = src_set.clone();
    let identity_for_gate = identity.clone();
    create_effect(move |_| {
        let visible = priority || force_visible || in_view.get();
        if visible && request.with(Option::is_none) {
            machine.update_value(|m| m.request());
            request.set(Some(AssetRequest {
                key: identity_for_gate(),
                url: src_for_gate.get_untracked(),
                src_set: src_set_for_gate.get_untracked(),
            }));
        }
    });

    let accept_complete = move |key: &str| {
        let accepted = machine
            .try_update_value(|m| m.complete(key))
            .unwrap_or(false);
        if accepted {
            clear_retry();
            stop_polling();
            set_loaded.set(true);
            if let Some(callback) = on_load {
                callback.call(());
            }
        }
        accepted
    };

    // Bounded completeness poll, self-cancelling on success, ceiling or unmount.
    create_effect(move |_| {
        let Some(AssetRequest { key, .. }) = request.get() else {
            return;
        };
        stop_polling();
        let check = move || {
            let complete = img_ref
                .get_untracked()
                .map(|img| img.complete() && img.natural_width() > 0)
                .unwrap_or(false);
            complete && accept_complete(&key)
        };
        if check() {
            return;
        }
        let interval = set_interval_with_handle(
            {
                let check = check.clone();
                move || {
                    if check() {
                        stop_polling();
                    }
                }
            },
            Duration::from_millis(COMPLETE_POLL_INTERVAL_MS),
        );
        let Ok(interval) = interval else {
            return;
        };
        match set_timeout_with_handle(
            move || stop_polling(),
            Duration::from_millis(COMPLETE_POLL_CEILING_MS),
        ) {
            Ok(ceiling) => poll_handles.set_value(Some((interval, ceiling))),
            Err(err) => {
                interval.clear();
                log::warn!("failed to bound completeness poll: {err:?}");
            }
        }
    });

    on_cleanup(move || {
        clear_retry();
        stop_polling();
    });

    let retry_sources = store_value((src.clone(), src_set.clone()));
    let schedule_retry = move |key: String| {
        let (base, base_set) =
            retry_sources.with_value(|(s, set)| (s.get_untracked(), set.get_untracked()));
        let scheduled = set_timeout_with_handle(
            move || {
                let attempt = machine.try_update_value(|m| m.retry()).unwrap_or(0);
                let url = with_retry_token(&base, attempt);
                let src_set = base_set
                    .as_deref()
                    .map(|set| with_retry_token_srcset(set, attempt));
                request.set(Some(AssetRequest { key, url, src_set }));
            },
            Duration::from_millis(retry_delay),
        );
        match scheduled {
            Ok(timer) => retry_timer.set_value(Some(timer)),
            Err(err) => log::warn!("failed to schedule picture retry: {err:?}"),
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

    let sizes_for_view = sizes.clone();
    let picture_view = move || {
        if failed.get() {
            return None;
        }
        // The request carries the (possibly retry-tokened) srcset so a retry
        // re-fetches every candidate, not just the fallback src.
        request.get().map(|AssetRequest { key, url, src_set }| {
            let candidates = src_set;
            let conditions = sizes_for_view.get();
            let load_key = key.clone();
            let handle_load = move |_| {
                accept_complete(&load_key);
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
                <picture class=ITEM_CLASS>
                    {candidates
                        .map(|srcset| view! { <source srcset=srcset sizes=conditions.clone()/> })}
                    <img
                        node_ref=img_ref
                        src=url
                        alt=alt.clone()
                        class=ITEM_CLASS
                        style=move || {
                            fade_style(fade_in, fade_in_duration, reduced_motion, loaded.get())
                        }

                        loading=if priority { "eager" } else { "lazy" }
                        fetchpriority=if priority { "high" } else { "auto" }
                        on:load=handle_load
                        on:error=handle_error
                    />
                </picture>
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
            {picture_view}
        </div>
    }
}
