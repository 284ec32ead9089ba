//! Debug checkers for the rewrite passes: a rewritten tree must keep the
//! root's datatype and column tree, and every annotated node must stay
//! internally consistent.

use thiserror::Error;

use crate::tcalc::TcExpr;

#[derive(Error, Debug)]
pub enum CheckError {
    #[error("rewrite changed the root datatype: {before} -> {after}")]
    RootType { before: String, after: String },

    #[error("rewrite changed the root column tree: {before} -> {after}")]
    RootColumns { before: String, after: String },

    #[error("node {node}: column tree arity {tree_arity} does not match row arity {row_arity}")]
    ArityMismatch {
        node: String,
        tree_arity: usize,
        row_arity: u32,
    },
}

/// Compare a tree against its pre-rewrite shape and audit the result's
/// annotations. Nodes that inference never annotated are skipped.
pub fn verify_rewrite(before: &TcExpr, after: &TcExpr) -> Result<(), CheckError> {
    if let (Some(tb), Some(ta)) = (&before.datatype, &after.datatype) {
        if tb != ta {
            return Err(CheckError::RootType {
                before: tb.name().to_owned(),
                after: ta.name().to_owned(),
            });
        }
    }
    if let (Some(cb), Some(ca)) = (&before.colnames, &after.colnames) {
        if !cb.eq_tree(ca) {
            return Err(CheckError::RootColumns {
                before: format!("{:?}", cb),
                after: format!("{:?}", ca),
            });
        }
    }
    verify_annotations(after)
}

/// Every node carrying both a relation type and a column tree must agree
/// with itself about row arity.
pub fn verify_annotations(e: &TcExpr) -> Result<(), CheckError> {
    let mut failure: Option<CheckError> = None;
    e.walk(&mut |node| {
        if failure.is_some() {
            return;
        }
        if let (Some(t), Some(ct)) = (&node.datatype, &node.colnames) {
            if t.is_set() || t.is_sequence() {
                let row_arity = t.nonset_arity();
                let tree_arity = ct.arity();
                if tree_arity as u32 != row_arity {
                    failure = Some(CheckError::ArityMismatch {
                        node: t.name().to_owned(),
                        tree_arity,
                        row_arity,
                    });
                }
            }
        }
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::{ColTree, NamePool};
    use crate::tcalc::TcGlobal;
    use crate::types::TypeManager;

    #[test]
    fn consistent_annotations_pass() {
        let tm = TypeManager::new();
        let names = NamePool::new();
        let (a, b) = (names.named("a"), names.named("b"));
        let e = TcExpr::readglobal(TcGlobal::new("R"))
            .with_type(tm.set(tm.tuple_specific(&[tm.int(), tm.string()])))
            .with_cols(ColTree::pair_of(a, b));
        verify_annotations(&e).unwrap();
        verify_rewrite(&e, &e).unwrap();
    }

    #[test]
    fn arity_mismatch_is_caught() {
        let tm = TypeManager::new();
        let names = NamePool::new();
        let a = names.named("a");
        let e = TcExpr::readglobal(TcGlobal::new("R"))
            .with_type(tm.set(tm.tuple_specific(&[tm.int(), tm.string()])))
            .with_cols(ColTree::scalar(Some(a)));
        assert!(matches!(
            verify_annotations(&e),
            Err(CheckError::ArityMismatch { .. })
        ));
    }

    #[test]
    fn root_type_change_is_caught() {
        let tm = TypeManager::new();
        let before = TcExpr::readglobal(TcGlobal::new("R")).with_type(tm.set(tm.int()));
        let after = TcExpr::readglobal(TcGlobal::new("R")).with_type(tm.set(tm.string()));
        assert!(matches!(
            verify_rewrite(&before, &after),
            Err(CheckError::RootType { .. })
        ));
    }
}
