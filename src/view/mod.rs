//! Pure view-state engines: selection, column layout, sorting, drag
//! handling, and context-menu gating. Nothing in here touches the bus or a
//! rendering surface.

pub mod columns;
pub mod context_menu;
pub mod drag;
pub mod selection;
pub mod sort;
