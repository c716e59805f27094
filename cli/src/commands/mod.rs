mod helpers;
mod history;
mod household;
mod suggest;

pub(crate) use history::cmd_history;
pub(crate) use household::{cmd_family, cmd_ingredients};
pub(crate) use suggest::cmd_suggest;
