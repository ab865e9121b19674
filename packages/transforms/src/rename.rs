//! Transforms that pass content through unchanged.

use actors::{ResultPayload, SourceFile, Transform, TransformFuture};

/// Returns the file as-is under its original name.
pub struct Identity;

impl Transform for Identity {
    fn name(&self) -> &str {
        "identity"
    }

    fn transform(&self, source: &SourceFile) -> TransformFuture {
        let data = source.content.clone();
        Box::pin(async move { Ok(ResultPayload::new(data)) })
    }
}

/// Keeps the content and upper-cases the file name.
pub struct UppercaseName;

impl Transform for UppercaseName {
    fn name(&self) -> &str {
        "uppercase-name"
    }

    fn transform(&self, source: &SourceFile) -> TransformFuture {
        let output = ResultPayload::named(source.name.to_uppercase(), source.content.clone());
        Box::pin(async move { Ok(output) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn uppercase_keeps_content() {
        let out = UppercaseName
            .transform(&SourceFile::new("a.png", vec![7u8; 3]))
            .await
            .unwrap();
        assert_eq!(out.output_name.as_deref(), Some("A.PNG"));
        assert_eq!(out.data, bytes::Bytes::from(vec![7u8; 3]));
    }

    #[tokio::test]
    async fn identity_has_no_output_name() {
        let out = Identity
            .transform(&SourceFile::new("a.png", "x"))
            .await
            .unwrap();
        assert!(out.output_name.is_none());
    }
}
