//! Presentation of training results: the console report and the ROC figure.

pub mod console;
pub mod roc_plot;

pub use console::{format_model_block, format_score_array, print_report};
pub use roc_plot::{render_roc_svg, write_roc_svg};
