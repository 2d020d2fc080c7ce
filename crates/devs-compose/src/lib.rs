//! `devs-compose`: model tree construction and wiring.
//!
//! # Crate layout
//!
//! | Module        | Contents                                                        |
//! |---------------|-----------------------------------------------------------------|
//! | [`tree`]      | `ModelTree` arena, `ModelNode`, `CoupledModel`                  |
//! | [`coupling`]  | `Coupling` definition of a coupled model                        |
//! | [`routing`]   | Leaf source/sink resolution, `FlatSink`, `RoutingTable`         |
//! | [`composer`]  | `ModelComposer::compose`                                        |
//! | [`binding`]   | Variable resolution and rewiring, HIOA ordering                 |
//! | [`error`]     | `CompositionError`, `CompositionResult<T>`                      |
//!
//! # Building a tree
//!
//! Trees are built bottom-up: add the leaves, then compose coupled models
//! from models already in the tree, then [`seal`](ModelTree::seal) the root.
//!
//! ```rust,ignore
//! let mut tree = ModelTree::new();
//! tree.add_atomic("a", ModelDeclarations::new().with_export("E"), Box::new(a))?;
//! tree.add_atomic("b", ModelDeclarations::new().with_import("E"), Box::new(b))?;
//! ModelComposer::compose(&mut tree, Coupling::new("root")
//!     .with_submodels(["a", "b"])
//!     .with_connection(EventSource::new("a", "E"), EventSink::new("b", "E")))?;
//! tree.seal("root")?;
//! ```
//!
//! # Feature flags
//!
//! | Flag      | Effect                                              |
//! |-----------|-----------------------------------------------------|
//! | `fx-hash` | Use `rustc-hash`'s FxHash for the routing tables.   |

pub mod binding;
pub mod composer;
pub mod coupling;
pub mod error;
pub mod routing;
pub mod tree;


pub use binding::{variable_atomic_sinks, variable_atomic_source, LeafVariable};
pub use composer::ModelComposer;
pub use coupling::{Binding, Connection, Coupling, ImportEdge, ImportedVariable, Reexport, ReexportedVariable};
pub use error::{CompositionError, CompositionResult};
pub use routing::{
    event_atomic_sinks, event_atomic_source, AtomicSink, AtomicSource, ExportRoute, ExportRoutes,
    FlatSink, ImportRoutes, RoutingTable,
};
pub use tree::{AtomicNode, CoupledModel, ModelNode, ModelTree, NodeKind};
