//! Pluggable per-document transforms.
//!
//! A transform may remap fields or drop a document entirely. The result is
//! a tagged action rather than an overloaded null, so "skip" can never be
//! confused with "no data".

use crate::error::Result;
use crate::store::DocumentData;

/// What a transform decided to do with one document.
#[derive(Debug, Clone)]
pub enum TransformAction {
    /// Write this (possibly rewritten) data to the destination.
    Keep(DocumentData),
    /// Do not write the document. It still counts as done for resume.
    Skip,
}

/// Identity of the document being transformed.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub id: &'a str,
    pub path: &'a str,
}

/// A user-supplied document transform.
///
/// Applied to every document read from the source, before id remapping and
/// conflict checks. An error counts against the document, not the run.
pub trait DocumentTransform: Send + Sync {
    fn apply(&self, data: DocumentData, ctx: &TransformContext<'_>) -> Result<TransformAction>;
}

/// Adapter turning a closure into a [`DocumentTransform`].
pub struct FnTransform<F>(pub F);

impl<F> DocumentTransform for FnTransform<F>
where
    F: Fn(DocumentData, &TransformContext<'_>) -> Result<TransformAction> + Send + Sync,
{
    fn apply(&self, data: DocumentData, ctx: &TransformContext<'_>) -> Result<TransformAction> {
        (self.0)(data, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fn_transform_rewrites_fields() {
        let transform = FnTransform(|mut data: DocumentData, _ctx: &TransformContext<'_>| {
            data.insert("migrated".to_string(), json!(true));
            Ok(TransformAction::Keep(data))
        });

        let ctx = TransformContext {
            id: "u1",
            path: "users/u1",
        };
        match transform.apply(DocumentData::new(), &ctx).unwrap() {
            TransformAction::Keep(data) => assert_eq!(data["migrated"], json!(true)),
            TransformAction::Skip => panic!("expected Keep"),
        }
    }

    #[test]
    fn test_fn_transform_can_skip() {
        let transform = FnTransform(|data: DocumentData, _ctx: &TransformContext<'_>| {
            if data.contains_key("internal") {
                Ok(TransformAction::Skip)
            } else {
                Ok(TransformAction::Keep(data))
            }
        });

        let ctx = TransformContext {
            id: "u1",
            path: "users/u1",
        };
        let mut data = DocumentData::new();
        data.insert("internal".to_string(), json!(true));
        assert!(matches!(
            transform.apply(data, &ctx).unwrap(),
            TransformAction::Skip
        ));
    }
}
