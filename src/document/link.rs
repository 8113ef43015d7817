//! Navigation targets followed by `Document::process_link`

use super::viewport::Viewport;

/// Built-in navigation actions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkAction {
    FirstPage,
    PrevPage,
    NextPage,
    LastPage,
    HistoryBack,
    HistoryForward,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Link {
    /// Jump to a viewport in the open document
    Goto(Viewport),
    /// Jump to a destination the generator resolves by name
    Named(String),
    Action(LinkAction),
}
