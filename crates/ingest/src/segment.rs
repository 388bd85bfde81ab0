use unicode_segmentation::UnicodeSegmentation;

/// Normalizes and segments raw text before it is tokenized.
pub trait Segmenter: Send + Sync {
    fn prepare(&self, text: &str) -> String;
}

/// Splits on Unicode sentence boundaries, flattens line breaks inside each
/// sentence and joins the sentences back with single spaces.
#[derive(Debug, Default, Clone, Copy)]
pub struct SentenceSegmenter;

impl Segmenter for SentenceSegmenter {
    fn prepare(&self, text: &str) -> String {
        text.unicode_sentences()
            .map(|sentence| sentence.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|sentence| !sentence.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Leaves text untouched, for input that was cleaned upstream.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl Segmenter for Passthrough {
    fn prepare(&self, text: &str) -> String {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentence_segmenter_flattens_lines() {
        let text = "Net revenue declined\nby 12 percent.  The company\n\nissued new debt.";
        let prepared = SentenceSegmenter.prepare(text);
        assert_eq!(
            prepared,
            "Net revenue declined by 12 percent. The company issued new debt."
        );
    }

    #[test]
    fn test_sentence_segmenter_keeps_tokens() {
        let text = "One two.\nThree four five.";
        let before: Vec<&str> = text.split_whitespace().collect();
        let prepared = SentenceSegmenter.prepare(text);
        let after: Vec<&str> = prepared.split_whitespace().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_passthrough_is_identity() {
        let text = "Line one\nline two.";
        assert_eq!(Passthrough.prepare(text), text);
    }
}
