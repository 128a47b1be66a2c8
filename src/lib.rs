pub mod annotate;
pub mod controls;
pub mod filter;
pub mod genome;
pub mod motif;
pub mod oracle;
pub mod region;
pub mod specificity;
pub mod subselect;
pub mod target;
pub mod tsv;
pub mod utils;
pub mod variants;

pub use annotate::AnnotateOptions;
pub use motif::ExtractOptions;
pub use specificity::SpecificityOptions;
pub use target::{Catalogue, Target};
pub use variants::VariantOptions;
