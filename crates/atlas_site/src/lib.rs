//! Content caches for an atlas site, built as rules on the `atlas_shake`
//! engine.
//!
//! - [`SiteListCache`] discovers every directory of the chart tree and its
//!   chart.
//! - [`TemplateCache`] compiles HTML templates together with everything they
//!   include.
//! - [`SiteJsonCache`] publishes every chart, enriched with the text of its
//!   linked SVG figures, as one JSON document.
//!
//! Each cache owns its engine and takes `&mut self`; wrap one in an
//! [`atlas_shake::Worker`] to share it between threads.

#![warn(missing_docs)]

pub mod chart;
pub mod question;
pub mod sitejson;
pub mod sitelist;
pub mod svgtext;
pub mod template;
pub mod transform;

pub use chart::{Chart, ChartDocument, ChartMeta, ContentResolver, IndexResolver};
pub use question::{SiteQuestion, SiteValue};
pub use sitejson::{AggregateEntry, AggregateRule, SiteJson, SiteJsonCache};
pub use sitelist::{ChartRule, DirRule, SiteEntry, SiteListCache};
pub use svgtext::SvgError;
pub use template::{
    ActionParser, CompiledTemplate, ParseError, TemplateCache, TemplateEntry, TemplateParser,
    TemplateQuestion, Tree,
};
pub use transform::{Derived, LinkTransform, Transform};
