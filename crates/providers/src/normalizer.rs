//! The delta normalizer: a single-pass streaming scanner that translates
//! raw provider fragments into the uniform [`StreamChunk`] vocabulary.
//!
//! Inline markup is recognized one character at a time — a chunk never has
//! to contain a whole tag, and a `<` that turns out not to open a known
//! tag is released as content instead of being held back. Native
//! structured tool-call fragments accumulate in per-index slots until the
//! finish signal and are then emitted as assembled `tool_call` events.

use std::collections::BTreeMap;

use spool_domain::chunk::{StreamChunk, ToolCallPayload};

use crate::delta::RawDelta;

// Standard XML-ish tags.
const FC_START: &str = "<fc>";
const FC_END: &str = "</fc>";

// Qwen tool-call tags, plus the "lazy" drift variants.
const TC_START: &str = "<tool_call>";
const TC_END: &str = "</tool_call>";
const TCODE_START: &str = "<tool_code>";
const TCODE_END: &str = "</tool_code>";
const MD_JSON_START: &str = "```json";
const MD_END: &str = "```";

// Reasoning / chain-of-thought blocks.
const TH_START: &str = "<think>";
const TH_END: &str = "</think>";
const DEC_START: &str = "<decision>";
const DEC_END: &str = "</decision>";
const PLAN_START: &str = "<plan>";
const PLAN_END: &str = "</plan>";

// Hermes / GPT-OSS channel tags.
const CH_ANALYSIS: &str = "<|channel|>analysis";
const CH_COMMENTARY: &str = "<|channel|>commentary";
const CH_FINAL: &str = "<|channel|>final";
const MSG_TAG: &str = "<|message|>";
const CALL_TAG: &str = "<|call|>";

// Kimi / Moonshot tool-call section tags.
const KIMI_SEC_START: &str = "<|tool_calls_section_begin|>";
const KIMI_SEC_END: &str = "<|tool_calls_section_end|>";
const KIMI_TC_START: &str = "<|tool_call_begin|>";
const KIMI_TC_END: &str = "<|tool_call_end|>";
const KIMI_ARG_START: &str = "<|tool_call_argument_begin|>";

/// Scanner state. One state, one transition table — every split-token edge
/// case is a plain `startswith` check against the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Content,
    Think,
    Plan,
    Decision,
    Fc,
    ToolCallXml,
    ToolCodeXml,
    MdJson,
    KimiRouter,
    KimiArgs,
    ChannelReasoning,
    ChannelToolMeta,
    ChannelToolPayload,
}

/// Opening tags recognized in `Content` state, with the state they enter.
/// `None` means the tag is consumed without leaving content (Hermes final
/// channel and message markers).
const CONTENT_TAGS: &[(&str, Option<ScanState>)] = &[
    (CH_ANALYSIS, Some(ScanState::ChannelReasoning)),
    (CH_COMMENTARY, Some(ScanState::ChannelToolMeta)),
    (CH_FINAL, None),
    (MSG_TAG, None),
    (FC_START, Some(ScanState::Fc)),
    (TC_START, Some(ScanState::ToolCallXml)),
    (TCODE_START, Some(ScanState::ToolCodeXml)),
    (MD_JSON_START, Some(ScanState::MdJson)),
    (TH_START, Some(ScanState::Think)),
    (DEC_START, Some(ScanState::Decision)),
    (PLAN_START, Some(ScanState::Plan)),
    (KIMI_SEC_START, Some(ScanState::KimiRouter)),
];

#[derive(Debug, Default)]
struct PendingCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Push-based normalizer: call [`feed`](Self::feed) per upstream delta,
/// then [`finish`](Self::finish) when the stream closes.
pub struct Normalizer {
    run_id: String,
    buffer: String,
    state: ScanState,
    slots: BTreeMap<u64, PendingCall>,
}

impl Normalizer {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            buffer: String::new(),
            state: ScanState::Content,
            slots: BTreeMap::new(),
        }
    }

    fn chunk(&self, kind: ScanState, content: String) -> StreamChunk {
        let run_id = self.run_id.clone();
        match kind {
            ScanState::Think | ScanState::ChannelReasoning => {
                StreamChunk::Reasoning { content, run_id }
            }
            ScanState::Plan => StreamChunk::Plan { content, run_id },
            ScanState::Decision => StreamChunk::Decision { content, run_id },
            ScanState::Fc
            | ScanState::ToolCallXml
            | ScanState::ToolCodeXml
            | ScanState::MdJson
            | ScanState::KimiArgs
            | ScanState::ChannelToolPayload => StreamChunk::CallArguments { content, run_id },
            _ => StreamChunk::Content { content, run_id },
        }
    }

    /// Consume one upstream delta, returning every event it completes.
    pub fn feed(&mut self, delta: &RawDelta) -> Vec<StreamChunk> {
        let mut out = Vec::new();

        // Native reasoning channel.
        if let Some(text) = &delta.reasoning {
            out.push(StreamChunk::Reasoning {
                content: text.clone(),
                run_id: self.run_id.clone(),
            });
        }

        // Native tool-call fragments accumulate by slot index; the text is
        // also surfaced incrementally as call_arguments.
        for tc in &delta.tool_calls {
            let slot = self.slots.entry(tc.index).or_default();
            if let Some(id) = &tc.id {
                slot.id.get_or_insert_with(|| id.clone());
            }
            if let Some(name) = &tc.name {
                slot.name.push_str(name);
                out.push(StreamChunk::CallArguments {
                    content: name.clone(),
                    run_id: self.run_id.clone(),
                });
            }
            if let Some(args) = &tc.arguments {
                if !args.is_empty() {
                    slot.arguments.push_str(args);
                    out.push(StreamChunk::CallArguments {
                        content: args.clone(),
                        run_id: self.run_id.clone(),
                    });
                }
            }
        }

        if delta.finish_reason.as_deref() == Some("tool_calls") {
            out.extend(self.flush_slots());
        }

        if let Some(seg) = &delta.content {
            if !seg.is_empty() {
                self.buffer.push_str(seg);
                self.scan(&mut out);
            }
        }

        out
    }

    /// Flush on upstream end: assembled native calls first, then any open
    /// inline block by its state.
    pub fn finish(&mut self) -> Vec<StreamChunk> {
        let mut out = self.flush_slots();

        if !self.buffer.is_empty() {
            let content = std::mem::take(&mut self.buffer);
            match self.state {
                // Router/meta noise between markers is dropped.
                ScanState::KimiRouter | ScanState::ChannelToolMeta => {}
                state => out.push(self.chunk(state, content)),
            }
        }
        out
    }

    fn flush_slots(&mut self) -> Vec<StreamChunk> {
        let slots = std::mem::take(&mut self.slots);
        slots
            .into_values()
            .filter(|slot| !slot.name.is_empty())
            .map(|slot| StreamChunk::ToolCall {
                content: ToolCallPayload {
                    name: slot.name,
                    arguments: slot.arguments,
                    call_id: slot.id,
                },
                run_id: self.run_id.clone(),
            })
            .collect()
    }

    // ── The character-level state machine ─────────────────────────

    fn scan(&mut self, out: &mut Vec<StreamChunk>) {
        while !self.buffer.is_empty() {
            let progressed = match self.state {
                ScanState::Content => self.scan_content(out),
                ScanState::Think | ScanState::Plan | ScanState::Decision => {
                    self.scan_block(out)
                }
                ScanState::Fc
                | ScanState::ToolCallXml
                | ScanState::ToolCodeXml
                | ScanState::MdJson => self.scan_tool_block(out),
                ScanState::KimiRouter => self.scan_kimi_router(),
                ScanState::KimiArgs => self.scan_kimi_args(out),
                ScanState::ChannelReasoning => self.scan_channel_reasoning(out),
                ScanState::ChannelToolMeta => self.scan_channel_tool_meta(),
                ScanState::ChannelToolPayload => self.scan_channel_tool_payload(out),
            };
            if !progressed {
                break;
            }
        }
    }

    /// Emit `content` up to the next candidate marker character, then try
    /// tag transitions. Returns false when the buffer is a partial tag
    /// prefix and more input is needed.
    fn scan_content(&mut self, out: &mut Vec<StreamChunk>) -> bool {
        let lt = self.buffer.find('<');
        let bt = self.buffer.find('`');
        let cutoff = match (lt, bt) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => {
                let content = std::mem::take(&mut self.buffer);
                out.push(self.chunk(ScanState::Content, content));
                return false;
            }
        };

        if cutoff > 0 {
            let content: String = self.buffer.drain(..cutoff).collect();
            out.push(self.chunk(ScanState::Content, content));
        }

        for (tag, next) in CONTENT_TAGS {
            if self.buffer.starts_with(tag) {
                if let Some(state) = next {
                    self.state = *state;
                }
                self.buffer.drain(..tag.len());
                return true;
            }
        }

        if CONTENT_TAGS
            .iter()
            .any(|(tag, _)| tag.starts_with(self.buffer.as_str()))
        {
            // Could still become a full opening marker.
            return false;
        }

        // False alarm, e.g. "a < b": release one character as content.
        self.emit_one_char(ScanState::Content, out);
        true
    }

    /// `<think>` / `<plan>` / `<decision>` bodies.
    fn scan_block(&mut self, out: &mut Vec<StreamChunk>) -> bool {
        let kind = self.state;
        let end_tag = match kind {
            ScanState::Think => TH_END,
            ScanState::Plan => PLAN_END,
            _ => DEC_END,
        };

        let Some(lt) = self.buffer.find('<') else {
            let content = std::mem::take(&mut self.buffer);
            out.push(self.chunk(kind, content));
            return false;
        };
        if lt > 0 {
            let content: String = self.buffer.drain(..lt).collect();
            out.push(self.chunk(kind, content));
        }

        if self.buffer.starts_with(end_tag) {
            self.buffer.drain(..end_tag.len());
            self.state = ScanState::Content;
            return true;
        }
        if end_tag.starts_with(self.buffer.as_str()) {
            return false;
        }
        self.emit_one_char(kind, out);
        true
    }

    /// `<fc>` / `<tool_call>` / `<tool_code>` / ```` ```json ```` bodies,
    /// streamed as `call_arguments`.
    fn scan_tool_block(&mut self, out: &mut Vec<StreamChunk>) -> bool {
        let kind = self.state;
        let end_tag = match kind {
            ScanState::Fc => FC_END,
            ScanState::ToolCallXml => TC_END,
            ScanState::ToolCodeXml => TCODE_END,
            _ => MD_END,
        };

        if self.buffer.starts_with(end_tag) {
            self.buffer.drain(..end_tag.len());
            self.state = ScanState::Content;
            return true;
        }
        if end_tag.starts_with(self.buffer.as_str()) {
            return false;
        }

        let first = end_tag.as_bytes()[0] as char;
        match self.buffer.find(first) {
            None => {
                let content = std::mem::take(&mut self.buffer);
                out.push(self.chunk(kind, content));
                false
            }
            Some(0) => {
                // Starts with the end tag's first char but is not the tag.
                self.emit_one_char(kind, out);
                true
            }
            Some(idx) => {
                let content: String = self.buffer.drain(..idx).collect();
                out.push(self.chunk(kind, content));
                true
            }
        }
    }

    /// Between Kimi section markers: route to argument bodies, swallow
    /// call-id noise.
    fn scan_kimi_router(&mut self) -> bool {
        if self.buffer.starts_with(KIMI_SEC_END) {
            self.buffer.drain(..KIMI_SEC_END.len());
            self.state = ScanState::Content;
            return true;
        }
        if self.buffer.starts_with(KIMI_ARG_START) {
            self.buffer.drain(..KIMI_ARG_START.len());
            self.state = ScanState::KimiArgs;
            return true;
        }
        if self.buffer.starts_with(KIMI_TC_START) {
            self.buffer.drain(..KIMI_TC_START.len());
            return true;
        }
        if self.buffer.starts_with(KIMI_TC_END) {
            self.buffer.drain(..KIMI_TC_END.len());
            return true;
        }

        let router_tags = [KIMI_SEC_END, KIMI_ARG_START, KIMI_TC_START, KIMI_TC_END];
        if router_tags
            .iter()
            .any(|tag| tag.starts_with(self.buffer.as_str()))
        {
            return false;
        }

        self.drop_one_char();
        true
    }

    fn scan_kimi_args(&mut self, out: &mut Vec<StreamChunk>) -> bool {
        if self.buffer.starts_with(KIMI_TC_END) {
            self.buffer.drain(..KIMI_TC_END.len());
            self.state = ScanState::KimiRouter;
            return true;
        }
        if KIMI_TC_END.starts_with(self.buffer.as_str()) {
            return false;
        }
        self.emit_one_char(ScanState::KimiArgs, out);
        true
    }

    fn scan_channel_reasoning(&mut self, out: &mut Vec<StreamChunk>) -> bool {
        if self.buffer.starts_with(CH_FINAL) {
            self.buffer.drain(..CH_FINAL.len());
            self.state = ScanState::Content;
            return true;
        }
        if self.buffer.starts_with(CH_COMMENTARY) {
            self.buffer.drain(..CH_COMMENTARY.len());
            self.state = ScanState::ChannelToolMeta;
            return true;
        }
        if [CH_FINAL, CH_COMMENTARY]
            .iter()
            .any(|tag| tag.starts_with(self.buffer.as_str()))
        {
            return false;
        }
        self.emit_one_char(ScanState::ChannelReasoning, out);
        true
    }

    /// Commentary header (`to=functions.x …<|message|>`): the header text
    /// itself is not surfaced, only the payload after the message marker.
    fn scan_channel_tool_meta(&mut self) -> bool {
        if let Some(pos) = self.buffer.find(MSG_TAG) {
            self.buffer.drain(..pos + MSG_TAG.len());
            self.state = ScanState::ChannelToolPayload;
            return true;
        }
        if self.buffer.contains(CH_FINAL) {
            self.buffer.clear();
            self.state = ScanState::Content;
            return true;
        }
        false
    }

    fn scan_channel_tool_payload(&mut self, out: &mut Vec<StreamChunk>) -> bool {
        let exits = [
            (CALL_TAG, ScanState::Content),
            (CH_FINAL, ScanState::Content),
            (CH_ANALYSIS, ScanState::ChannelReasoning),
        ];
        for (tag, next) in exits {
            if self.buffer.starts_with(tag) {
                self.buffer.drain(..tag.len());
                self.state = next;
                return true;
            }
        }
        if exits
            .iter()
            .any(|(tag, _)| tag.starts_with(self.buffer.as_str()))
        {
            return false;
        }
        self.emit_one_char(ScanState::ChannelToolPayload, out);
        true
    }

    // ── Small helpers ─────────────────────────────────────────────

    fn emit_one_char(&mut self, kind: ScanState, out: &mut Vec<StreamChunk>) {
        let ch = self.take_one_char();
        // Coalesce with a preceding chunk of the same kind to keep the
        // event stream from degenerating into per-character frames.
        if let Some(last) = out.last_mut() {
            if same_kind(last, kind) {
                if let Some(existing) = chunk_text_mut(last) {
                    existing.push(ch);
                    return;
                }
            }
        }
        let chunk = self.chunk(kind, ch.to_string());
        out.push(chunk);
    }

    fn drop_one_char(&mut self) {
        self.take_one_char();
    }

    fn take_one_char(&mut self) -> char {
        let ch = self.buffer.chars().next().unwrap_or('\0');
        let len = ch.len_utf8();
        self.buffer.drain(..len);
        ch
    }
}

fn same_kind(chunk: &StreamChunk, kind: ScanState) -> bool {
    matches!(
        (chunk, kind),
        (StreamChunk::Content { .. }, ScanState::Content)
            | (StreamChunk::Reasoning { .. }, ScanState::Think)
            | (StreamChunk::Reasoning { .. }, ScanState::ChannelReasoning)
            | (StreamChunk::Plan { .. }, ScanState::Plan)
            | (StreamChunk::Decision { .. }, ScanState::Decision)
            | (StreamChunk::CallArguments { .. }, ScanState::Fc)
            | (StreamChunk::CallArguments { .. }, ScanState::ToolCallXml)
            | (StreamChunk::CallArguments { .. }, ScanState::ToolCodeXml)
            | (StreamChunk::CallArguments { .. }, ScanState::MdJson)
            | (StreamChunk::CallArguments { .. }, ScanState::KimiArgs)
            | (StreamChunk::CallArguments { .. }, ScanState::ChannelToolPayload)
    )
}

fn chunk_text_mut(chunk: &mut StreamChunk) -> Option<&mut String> {
    match chunk {
        StreamChunk::Content { content, .. }
        | StreamChunk::Reasoning { content, .. }
        | StreamChunk::Plan { content, .. }
        | StreamChunk::Decision { content, .. }
        | StreamChunk::CallArguments { content, .. } => Some(content),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::ToolCallDelta;

    fn run(deltas: &[&str]) -> Vec<StreamChunk> {
        let mut n = Normalizer::new("run_t");
        let mut out = Vec::new();
        for d in deltas {
            out.extend(n.feed(&RawDelta::text(*d)));
        }
        out.extend(n.finish());
        out
    }

    fn collect(chunks: &[StreamChunk], pick: fn(&StreamChunk) -> Option<&str>) -> String {
        chunks.iter().filter_map(pick).collect()
    }

    fn content_of(c: &StreamChunk) -> Option<&str> {
        match c {
            StreamChunk::Content { content, .. } => Some(content),
            _ => None,
        }
    }

    fn reasoning_of(c: &StreamChunk) -> Option<&str> {
        match c {
            StreamChunk::Reasoning { content, .. } => Some(content),
            _ => None,
        }
    }

    fn call_args_of(c: &StreamChunk) -> Option<&str> {
        match c {
            StreamChunk::CallArguments { content, .. } => Some(content),
            _ => None,
        }
    }

    #[test]
    fn plain_content_passes_through() {
        let chunks = run(&["Hello, ", "world"]);
        assert_eq!(collect(&chunks, content_of), "Hello, world");
        assert!(chunks
            .iter()
            .all(|c| matches!(c, StreamChunk::Content { .. })));
    }

    #[test]
    fn lone_angle_bracket_is_content() {
        let chunks = run(&["a < b and a <b too"]);
        assert_eq!(collect(&chunks, content_of), "a < b and a <b too");
    }

    #[test]
    fn angle_bracket_at_stream_end_flushes() {
        // "<" alone could still open a tag — it must flush on finish.
        let chunks = run(&["total <"]);
        assert_eq!(collect(&chunks, content_of), "total <");
    }

    #[test]
    fn think_block_becomes_reasoning() {
        let chunks = run(&["<think>step one</think>done"]);
        assert_eq!(collect(&chunks, reasoning_of), "step one");
        assert_eq!(collect(&chunks, content_of), "done");
    }

    #[test]
    fn think_tag_split_across_deltas() {
        let chunks = run(&["<th", "ink>rea", "soning</th", "ink>after"]);
        assert_eq!(collect(&chunks, reasoning_of), "reasoning");
        assert_eq!(collect(&chunks, content_of), "after");
    }

    #[test]
    fn plan_and_decision_blocks() {
        let chunks = run(&["<plan>first</plan><decision>go</decision>"]);
        let plan = collect(&chunks, |c| match c {
            StreamChunk::Plan { content, .. } => Some(content.as_str()),
            _ => None,
        });
        let decision = collect(&chunks, |c| match c {
            StreamChunk::Decision { content, .. } => Some(content.as_str()),
            _ => None,
        });
        assert_eq!(plan, "first");
        assert_eq!(decision, "go");
    }

    #[test]
    fn fc_block_streams_call_arguments() {
        let payload = r#"{"name":"get_flight_times","arguments":{"departure":"LAX","arrival":"JFK"}}"#;
        let text = format!("<fc>{payload}</fc>");
        let chunks = run(&[text.as_str()]);
        assert_eq!(collect(&chunks, call_args_of), payload);
        assert_eq!(collect(&chunks, content_of), "");
    }

    #[test]
    fn fc_tag_split_across_chunks() {
        let chunks = run(&["<f", "c>{\"name\":\"x\",\"arguments\":{}}<", "/fc>"]);
        assert_eq!(
            collect(&chunks, call_args_of),
            "{\"name\":\"x\",\"arguments\":{}}"
        );
    }

    #[test]
    fn markup_tags_never_leak_into_content() {
        let chunks = run(&["<fc>{\"name\":\"t\",\"arguments\":{}}</fc>ok"]);
        let text = collect(&chunks, content_of);
        assert!(!text.contains("<fc>"));
        assert!(!text.contains("</fc>"));
        assert_eq!(text, "ok");
    }

    #[test]
    fn qwen_tool_call_and_tool_code_dialects() {
        let chunks = run(&["<tool_call>{\"a\":1}</tool_call>"]);
        assert_eq!(collect(&chunks, call_args_of), "{\"a\":1}");

        let chunks = run(&["<tool_code>{\"b\":2}</tool_code>"]);
        assert_eq!(collect(&chunks, call_args_of), "{\"b\":2}");
    }

    #[test]
    fn markdown_json_fence() {
        let chunks = run(&["```json\n{\"name\":\"t\"}\n```after"]);
        assert_eq!(collect(&chunks, call_args_of), "\n{\"name\":\"t\"}\n");
        assert_eq!(collect(&chunks, content_of), "after");
    }

    #[test]
    fn plain_backtick_is_content() {
        let chunks = run(&["use `code` here"]);
        assert_eq!(collect(&chunks, content_of), "use `code` here");
    }

    #[test]
    fn hermes_analysis_channel_is_reasoning() {
        let chunks = run(&["<|channel|>analysislet me think<|channel|>finalanswer"]);
        assert_eq!(collect(&chunks, reasoning_of), "let me think");
        assert_eq!(collect(&chunks, content_of), "answer");
    }

    #[test]
    fn hermes_commentary_payload_is_call_arguments() {
        let chunks = run(&[
            "<|channel|>commentary to=functions.get_weather<|message|>{\"city\":\"Paris\"}<|call|>",
        ]);
        assert_eq!(collect(&chunks, call_args_of), "{\"city\":\"Paris\"}");
        // The commentary header is consumed, never surfaced.
        assert_eq!(collect(&chunks, content_of), "");
    }

    #[test]
    fn kimi_section_arguments() {
        let chunks = run(&[
            "<|tool_calls_section_begin|><|tool_call_begin|>fn0<|tool_call_argument_begin|>{\"q\":1}<|tool_call_end|><|tool_calls_section_end|>tail",
        ]);
        assert_eq!(collect(&chunks, call_args_of), "{\"q\":1}");
        assert_eq!(collect(&chunks, content_of), "tail");
    }

    #[test]
    fn unterminated_think_flushes_as_reasoning() {
        let chunks = run(&["<think>never closed"]);
        assert_eq!(collect(&chunks, reasoning_of), "never closed");
    }

    #[test]
    fn unterminated_fc_flushes_as_call_arguments() {
        let chunks = run(&["<fc>{\"name\":\"t\""]);
        assert_eq!(collect(&chunks, call_args_of), "{\"name\":\"t\"");
    }

    #[test]
    fn native_tool_calls_accumulate_by_slot() {
        let mut n = Normalizer::new("run_t");
        let mut out = Vec::new();

        out.extend(n.feed(&RawDelta {
            tool_calls: vec![ToolCallDelta {
                index: 0,
                id: Some("call_1".into()),
                name: Some("get_flight_times".into()),
                arguments: Some(String::new()),
            }],
            ..Default::default()
        }));
        out.extend(n.feed(&RawDelta {
            tool_calls: vec![ToolCallDelta {
                index: 0,
                arguments: Some("{\"departure\":\"LAX\",".into()),
                ..Default::default()
            }],
            ..Default::default()
        }));
        out.extend(n.feed(&RawDelta {
            tool_calls: vec![ToolCallDelta {
                index: 0,
                arguments: Some("\"arrival\":\"JFK\"}".into()),
                ..Default::default()
            }],
            finish_reason: Some("tool_calls".into()),
            ..Default::default()
        }));

        let assembled: Vec<_> = out
            .iter()
            .filter_map(|c| match c {
                StreamChunk::ToolCall { content, .. } => Some(content),
                _ => None,
            })
            .collect();
        assert_eq!(assembled.len(), 1);
        assert_eq!(assembled[0].name, "get_flight_times");
        assert_eq!(
            assembled[0].arguments,
            "{\"departure\":\"LAX\",\"arrival\":\"JFK\"}"
        );
        assert_eq!(assembled[0].call_id.as_deref(), Some("call_1"));

        // The streamed fragments were also surfaced incrementally.
        let streamed = collect(&out, call_args_of);
        assert!(streamed.contains("get_flight_times"));
        assert!(streamed.contains("LAX"));
    }

    #[test]
    fn two_parallel_native_slots() {
        let mut n = Normalizer::new("run_t");
        n.feed(&RawDelta {
            tool_calls: vec![
                ToolCallDelta {
                    index: 0,
                    id: Some("call_a".into()),
                    name: Some("alpha".into()),
                    arguments: Some("{}".into()),
                },
                ToolCallDelta {
                    index: 1,
                    id: Some("call_b".into()),
                    name: Some("beta".into()),
                    arguments: Some("{}".into()),
                },
            ],
            ..Default::default()
        });
        let out = n.finish();
        let names: Vec<_> = out
            .iter()
            .filter_map(|c| match c {
                StreamChunk::ToolCall { content, .. } => Some(content.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn native_flush_without_finish_reason() {
        // Stream ended before the finish signal: finish() still assembles.
        let mut n = Normalizer::new("run_t");
        n.feed(&RawDelta {
            tool_calls: vec![ToolCallDelta {
                index: 0,
                id: Some("call_z".into()),
                name: Some("zeta".into()),
                arguments: Some("{\"k\":9}".into()),
            }],
            ..Default::default()
        });
        let out = n.finish();
        assert!(out.iter().any(|c| matches!(
            c,
            StreamChunk::ToolCall { content, .. } if content.name == "zeta"
        )));
    }

    #[test]
    fn reasoning_field_streams_through() {
        let mut n = Normalizer::new("run_t");
        let out = n.feed(&RawDelta {
            reasoning: Some("deep thought".into()),
            ..Default::default()
        });
        assert_eq!(collect(&out, reasoning_of), "deep thought");
    }

    #[test]
    fn interleaved_content_and_fc() {
        let chunks = run(&["Sure. <fc>{\"name\":\"t\",\"arguments\":{}}</fc> Done."]);
        assert_eq!(collect(&chunks, content_of), "Sure.  Done.");
        assert_eq!(
            collect(&chunks, call_args_of),
            "{\"name\":\"t\",\"arguments\":{}}"
        );
    }

    #[test]
    fn events_preserve_input_order() {
        let chunks = run(&["A<think>B</think>C"]);
        let kinds: Vec<_> = chunks
            .iter()
            .map(|c| match c {
                StreamChunk::Content { .. } => "content",
                StreamChunk::Reasoning { .. } => "reasoning",
                _ => "other",
            })
            .collect();
        // Content before reasoning before content; no interleaving.
        let first_r = kinds.iter().position(|k| *k == "reasoning").unwrap();
        assert!(kinds[..first_r].iter().all(|k| *k == "content"));
        assert!(kinds[first_r..].iter().filter(|k| **k == "reasoning").count() >= 1);
        assert_eq!(*kinds.last().unwrap(), "content");
    }

    #[test]
    fn single_char_deltas_reassemble() {
        let text = "<fc>{\"name\":\"x\",\"arguments\":{\"a\":1}}</fc>";
        let deltas: Vec<String> = text.chars().map(|c| c.to_string()).collect();
        let refs: Vec<&str> = deltas.iter().map(String::as_str).collect();
        let chunks = run(&refs);
        assert_eq!(
            collect(&chunks, call_args_of),
            "{\"name\":\"x\",\"arguments\":{\"a\":1}}"
        );
        assert_eq!(collect(&chunks, content_of), "");
    }
}
