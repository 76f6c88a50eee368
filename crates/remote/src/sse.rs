//! SSE buffer handling for the event stream.
//!
//! Events are delimited by `\n\n`. Only `data:` lines carry payloads;
//! lines starting with `:` are comments and empty lines are keep-alives,
//! both ignored. The buffer is drained in place, leaving any trailing
//! partial event for the next call.

pub(crate) fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut data_lines = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos).collect();
        buffer.drain(..2); // remove the \n\n delimiter

        for line in block.lines() {
            let line = line.trim();
            if line.starts_with(':') {
                continue; // SSE comment
            }
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    data_lines.push(data.to_string());
                }
            }
        }
    }

    data_lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_single_complete_event() {
        let mut buf = String::from("data: {\"type\":\"stream_started\"}\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["{\"type\":\"stream_started\"}"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_multiple_events() {
        let mut buf = String::from("data: first\n\ndata: second\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["first", "second"]);
    }

    #[test]
    fn partial_event_stays_in_buffer() {
        let mut buf = String::from("data: complete\n\ndata: partial");
        assert_eq!(drain_data_lines(&mut buf), vec!["complete"]);
        assert_eq!(buf, "data: partial");
    }

    #[test]
    fn comments_and_keepalives_are_skipped() {
        let mut buf = String::from(": ping\n\n\n\ndata: payload\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["payload"]);
    }

    #[test]
    fn ignores_non_data_lines() {
        let mut buf = String::from("event: message\nid: 1\ndata: payload\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["payload"]);
    }

    #[test]
    fn incremental_buffering() {
        let mut buf = String::from("data: chu");
        assert!(drain_data_lines(&mut buf).is_empty());
        buf.push_str("nk\n\n");
        assert_eq!(drain_data_lines(&mut buf), vec!["chunk"]);
    }
}
