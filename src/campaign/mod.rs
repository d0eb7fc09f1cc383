//! Campaign parameters and the prompt template built from them.

pub mod model;
pub mod template;

pub use model::{CampaignParameters, Goal};
pub use template::{PromptTemplate, RowFields};
