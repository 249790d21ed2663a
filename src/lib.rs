//! Lazy-loading image components for Leptos.
//!
//! [`LazyImage`] renders a single raster source and [`LazyPicture`] a
//! responsive `<picture>` element. Both defer fetching until the element
//! nears the viewport, show at most one placeholder tier (blurhash canvas,
//! LQIP, generic placeholder) while loading, and retry failed loads a bounded
//! number of times before rendering fallback content.

pub mod image;
pub mod load_state;
pub mod picture;
pub mod placeholder;
pub mod style;
pub mod use_in_view;

pub use image::LazyImage;
pub use picture::LazyPicture;
pub use placeholder::{
    choose_placeholder, decode_blurhash, PlaceholderChoice, PlaceholderError, PlaceholderSpec,
};
pub use style::ensure_styles;
pub use use_in_view::{use_in_view, InViewOptions};
