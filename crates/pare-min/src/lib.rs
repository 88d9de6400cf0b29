//! Annotation minimization for verified programs.
//!
//! A [`Minimizer`] session takes a program that verifies, inventories its
//! removable annotations (asserts, loop invariants, termination measures,
//! lemma calls, calc proofs) and removes as many as it can while an external
//! [`Oracle`](pare_oracle::Oracle) keeps accepting the program.

pub mod batched;
pub mod candidate;
pub mod error;
pub mod explore;
pub mod inventory;
pub mod minimizer;
pub mod proof;
pub mod report;
pub mod sequential;
pub mod simplify;
pub mod wildcard;

pub use candidate::{Candidate, CandidateId, CandidateKind, Detached, Host, Item, KindSet, Location};
pub use error::{MinimizeError, MinimizeResult};
pub use explore::{maximal, OrderStudy};
pub use inventory::{Inventory, ScopeInventory, WildcardForest, WildcardNode};
pub use minimizer::{MinimizeConfig, MinimizeOutcome, Minimizer, RunStats, Status, Strategy};
pub use proof::ProofBlockEdit;
pub use report::{KindRow, Report, ScopeReport};
pub use simplify::{conjoin, conjuncts, Simplification, SimplificationResult};
