//! Extraction of the JSON payload from a model reply
//!
//! The reply is either bare JSON, or prose around exactly one fenced block
//! (three backticks, optional info string such as `json`). Anything else is
//! rejected instead of guessed at.

const FENCE: &str = "```";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FenceError {
    #[error("Code fence opened but never closed")]
    Unterminated,

    #[error("Expected a single fenced block, found {0}")]
    MultipleBlocks(usize),

    #[error("No content to parse")]
    Empty,
}

#[derive(Clone, Copy)]
enum State {
    Outside,
    InBlock { body_start: usize },
}

/// Returns the body of the only fenced block, or the whole text when unfenced
pub fn extract_json_block(text: &str) -> Result<&str, FenceError> {
    let mut state = State::Outside;
    let mut blocks: Vec<&str> = Vec::new();
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let trimmed = line.trim();

        state = match state {
            State::Outside if trimmed.starts_with(FENCE) => State::InBlock { body_start: offset },
            State::Outside => State::Outside,
            State::InBlock { body_start } if trimmed == FENCE => {
                blocks.push(&text[body_start..line_start]);
                State::Outside
            }
            in_block => in_block,
        };
    }

    if let State::InBlock { .. } = state {
        return Err(FenceError::Unterminated);
    }

    let body = match blocks.as_slice() {
        [] => text,
        [only] => *only,
        many => return Err(FenceError::MultipleBlocks(many.len())),
    };

    let body = body.trim();
    if body.is_empty() {
        return Err(FenceError::Empty);
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_json() {
        assert_eq!(
            extract_json_block("  {\"tables\": []}\n"),
            Ok("{\"tables\": []}")
        );
    }

    #[test]
    fn test_fenced_json_with_prose() {
        let reply = "Here is the structure:\n```json\n{\"tables\": []}\n```\nLet me know!";
        assert_eq!(extract_json_block(reply), Ok("{\"tables\": []}"));
    }

    #[test]
    fn test_fence_without_info_string() {
        let reply = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json_block(reply), Ok("{\"a\": 1}"));
    }

    #[test]
    fn test_indented_fences() {
        let reply = "  ```json\n  {\"a\": 1}\n  ```  \n";
        assert_eq!(extract_json_block(reply), Ok("{\"a\": 1}"));
    }

    #[test]
    fn test_crlf_line_endings() {
        let reply = "```json\r\n{\"a\": 1}\r\n```\r\n";
        assert_eq!(extract_json_block(reply), Ok("{\"a\": 1}"));
    }

    #[test]
    fn test_unterminated_fence() {
        let reply = "```json\n{\"tables\": []}\n";
        assert_eq!(extract_json_block(reply), Err(FenceError::Unterminated));
    }

    #[test]
    fn test_multiple_blocks_rejected() {
        let reply = "```json\n{}\n```\nand\n```json\n{}\n```";
        assert_eq!(extract_json_block(reply), Err(FenceError::MultipleBlocks(2)));
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(extract_json_block(""), Err(FenceError::Empty));
        assert_eq!(extract_json_block("   \n"), Err(FenceError::Empty));
        assert_eq!(extract_json_block("```json\n\n```"), Err(FenceError::Empty));
    }

    #[test]
    fn test_info_line_closing_fence_is_not_a_close() {
        // "```json" cannot close a block; only a bare fence does
        let reply = "```\n{}\n```json\n";
        assert_eq!(extract_json_block(reply), Err(FenceError::Unterminated));
    }
}
