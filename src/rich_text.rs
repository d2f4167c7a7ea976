use htmlescape::encode_minimal;
use pulldown_cmark::{html, CowStr, Event, HeadingLevel, LinkType, Tag, TagEnd};
use serde::Deserialize;

use crate::models::null_as_default;

/// Structured text as stored by Prismic: an ordered list of blocks.
pub type RichText = Vec<RichTextBlock>;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RichTextBlock {
    #[serde(rename = "type")]
    pub kind: BlockKind,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub spans: Vec<Span>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub alt: Option<String>,
    #[serde(default)]
    pub oembed: Option<Embed>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BlockKind {
    Paragraph,
    Preformatted,
    Heading1,
    Heading2,
    Heading3,
    Heading4,
    Heading5,
    Heading6,
    ListItem,
    OListItem,
    Image,
    Embed,
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Embed {
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub embed_url: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Inline formatting over `text[start..end]`. Offsets count UTF-16 code units.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    #[serde(rename = "type")]
    pub kind: SpanKind,
    #[serde(default)]
    pub data: Option<SpanData>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    Strong,
    Em,
    Hyperlink,
    Label,
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SpanData {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

#[cfg(test)]
impl RichTextBlock {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Paragraph,
            text: text.into(),
            spans: Vec::new(),
            url: None,
            alt: None,
            oembed: None,
        }
    }
}

/// Plain text of every block, joined by a single space.
pub fn as_text(blocks: &[RichTextBlock]) -> String {
    blocks
        .iter()
        .map(|block| block.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Renders rich text to HTML. Consecutive list items share one `<ul>`/`<ol>`.
pub fn as_html(blocks: &[RichTextBlock]) -> String {
    let mut events: Vec<Event<'_>> = Vec::new();
    let mut open_list: Option<bool> = None;

    for block in blocks {
        let list_kind = match block.kind {
            BlockKind::ListItem => Some(false),
            BlockKind::OListItem => Some(true),
            _ => None,
        };
        if open_list != list_kind {
            if let Some(ordered) = open_list {
                events.push(Event::End(TagEnd::List(ordered)));
            }
            if let Some(ordered) = list_kind {
                events.push(Event::Start(Tag::List(ordered.then_some(1))));
            }
            open_list = list_kind;
        }
        push_block(&mut events, block);
    }
    if let Some(ordered) = open_list {
        events.push(Event::End(TagEnd::List(ordered)));
    }

    let mut html_out = String::new();
    html::push_html(&mut html_out, events.into_iter());
    html_out
}

fn heading_level(kind: BlockKind) -> Option<HeadingLevel> {
    match kind {
        BlockKind::Heading1 => Some(HeadingLevel::H1),
        BlockKind::Heading2 => Some(HeadingLevel::H2),
        BlockKind::Heading3 => Some(HeadingLevel::H3),
        BlockKind::Heading4 => Some(HeadingLevel::H4),
        BlockKind::Heading5 => Some(HeadingLevel::H5),
        BlockKind::Heading6 => Some(HeadingLevel::H6),
        _ => None,
    }
}

fn push_block<'a>(events: &mut Vec<Event<'a>>, block: &'a RichTextBlock) {
    if let Some(level) = heading_level(block.kind) {
        events.push(Event::Start(Tag::Heading {
            level,
            id: None,
            classes: Vec::new(),
            attrs: Vec::new(),
        }));
        push_inline(events, &block.text, &block.spans);
        events.push(Event::End(TagEnd::Heading(level)));
        return;
    }

    match block.kind {
        BlockKind::Paragraph => {
            events.push(Event::Start(Tag::Paragraph));
            push_inline(events, &block.text, &block.spans);
            events.push(Event::End(TagEnd::Paragraph));
        }
        BlockKind::Preformatted => {
            events.push(Event::Html(CowStr::Borrowed("<pre>")));
            push_inline(events, &block.text, &block.spans);
            events.push(Event::Html(CowStr::Borrowed("</pre>\n")));
        }
        BlockKind::ListItem | BlockKind::OListItem => {
            events.push(Event::Start(Tag::Item));
            push_inline(events, &block.text, &block.spans);
            events.push(Event::End(TagEnd::Item));
        }
        BlockKind::Image => {
            let Some(url) = block.url.as_deref() else {
                return;
            };
            events.push(Event::Html(CowStr::Borrowed("<p class=\"block-img\">")));
            events.push(Event::Start(Tag::Image {
                link_type: LinkType::Inline,
                dest_url: CowStr::Borrowed(url),
                title: CowStr::Borrowed(""),
                id: CowStr::Borrowed(""),
            }));
            if let Some(alt) = block.alt.as_deref() {
                events.push(Event::Text(CowStr::Borrowed(alt)));
            }
            events.push(Event::End(TagEnd::Image));
            events.push(Event::Html(CowStr::Borrowed("</p>\n")));
        }
        BlockKind::Embed => {
            let Some(embed) = block.oembed.as_ref() else {
                return;
            };
            // The embed markup comes from the oEmbed provider and is emitted as-is.
            events.push(Event::Html(CowStr::from(format!(
                "<div data-oembed=\"{}\" data-oembed-type=\"{}\">{}</div>\n",
                encode_minimal(embed.embed_url.as_deref().unwrap_or_default()),
                encode_minimal(embed.kind.as_deref().unwrap_or_default()),
                embed.html.as_deref().unwrap_or_default(),
            ))));
        }
        _ => {}
    }
}

/// Byte index of the character boundary at `utf16` code units into `text`, clamped to its length.
fn byte_offset(text: &str, utf16: usize) -> usize {
    let mut units = 0;
    for (index, ch) in text.char_indices() {
        if units >= utf16 {
            return index;
        }
        units += ch.len_utf16();
    }
    text.len()
}

fn push_inline<'a>(events: &mut Vec<Event<'a>>, text: &'a str, spans: &'a [Span]) {
    let mut ranges: Vec<(usize, usize, &Span)> = spans
        .iter()
        .filter(|span| span.kind != SpanKind::Unknown)
        .map(|span| (byte_offset(text, span.start), byte_offset(text, span.end), span))
        .filter(|(start, end, _)| start < end)
        .collect();
    // Outer spans first so nesting follows containment.
    ranges.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

    let mut cuts: Vec<usize> = vec![0, text.len()];
    for (start, end, _) in &ranges {
        cuts.push(*start);
        cuts.push(*end);
    }
    cuts.sort_unstable();
    cuts.dedup();

    let mut stack: Vec<usize> = Vec::new();
    for window in cuts.windows(2) {
        let (from, to) = (window[0], window[1]);
        let active: Vec<usize> = ranges
            .iter()
            .enumerate()
            .filter(|(_, range)| range.0 <= from && to <= range.1)
            .map(|(index, _)| index)
            .collect();

        let common = stack
            .iter()
            .zip(&active)
            .take_while(|(open, wanted)| open == wanted)
            .count();
        for index in stack.drain(common..).rev() {
            events.push(close_span(ranges[index].2));
        }
        for &index in &active[common..] {
            events.push(open_span(ranges[index].2));
            stack.push(index);
        }

        push_text(events, &text[from..to]);
    }
    for index in stack.drain(..).rev() {
        events.push(close_span(ranges[index].2));
    }
}

fn push_text<'a>(events: &mut Vec<Event<'a>>, text: &'a str) {
    for (line, part) in text.split('\n').enumerate() {
        if line > 0 {
            events.push(Event::HardBreak);
        }
        if !part.is_empty() {
            events.push(Event::Text(CowStr::Borrowed(part)));
        }
    }
}

fn link_href(data: Option<&SpanData>) -> String {
    match data {
        Some(SpanData { url: Some(url), .. }) => url.clone(),
        Some(SpanData { uid: Some(uid), .. }) => format!("/post/{}", uid),
        _ => "#".to_string(),
    }
}

fn open_span(span: &Span) -> Event<'static> {
    match span.kind {
        SpanKind::Strong => Event::Start(Tag::Strong),
        SpanKind::Em => Event::Start(Tag::Emphasis),
        SpanKind::Hyperlink => {
            let href = encode_minimal(&link_href(span.data.as_ref()));
            let anchor = match span.data.as_ref().and_then(|d| d.target.as_deref()) {
                Some(target) => format!(
                    "<a href=\"{}\" target=\"{}\" rel=\"noopener\">",
                    href,
                    encode_minimal(target)
                ),
                None => format!("<a href=\"{}\">", href),
            };
            Event::InlineHtml(CowStr::from(anchor))
        }
        SpanKind::Label => {
            let label = span
                .data
                .as_ref()
                .and_then(|d| d.label.as_deref())
                .unwrap_or_default();
            Event::InlineHtml(CowStr::from(format!(
                "<span class=\"{}\">",
                encode_minimal(label)
            )))
        }
        SpanKind::Unknown => Event::InlineHtml(CowStr::Borrowed("")),
    }
}

fn close_span(span: &Span) -> Event<'static> {
    match span.kind {
        SpanKind::Strong => Event::End(TagEnd::Strong),
        SpanKind::Em => Event::End(TagEnd::Emphasis),
        SpanKind::Hyperlink => Event::InlineHtml(CowStr::Borrowed("</a>")),
        SpanKind::Label => Event::InlineHtml(CowStr::Borrowed("</span>")),
        SpanKind::Unknown => Event::InlineHtml(CowStr::Borrowed("")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: usize, end: usize, kind: SpanKind) -> Span {
        Span {
            start,
            end,
            kind,
            data: None,
        }
    }

    fn with_spans(text: &str, spans: Vec<Span>) -> RichTextBlock {
        RichTextBlock {
            spans,
            ..RichTextBlock::paragraph(text)
        }
    }

    fn block(kind: BlockKind, text: &str) -> RichTextBlock {
        RichTextBlock {
            kind,
            ..RichTextBlock::paragraph(text)
        }
    }

    #[test]
    fn renders_plain_paragraph() {
        let output = as_html(&[RichTextBlock::paragraph("Hello world")]);
        assert_eq!(output, "<p>Hello world</p>\n");
    }

    #[test]
    fn renders_strong_span() {
        let output = as_html(&[with_spans("Hello world", vec![span(0, 5, SpanKind::Strong)])]);
        assert_eq!(output, "<p><strong>Hello</strong> world</p>\n");
    }

    #[test]
    fn overlapping_spans_stay_well_nested() {
        let output = as_html(&[with_spans(
            "abcdef",
            vec![span(0, 4, SpanKind::Strong), span(2, 6, SpanKind::Em)],
        )]);
        assert_eq!(
            output,
            "<p><strong>ab<em>cd</em></strong><em>ef</em></p>\n"
        );
    }

    #[test]
    fn span_offsets_count_utf16_units() {
        let output = as_html(&[with_spans("😀 bold", vec![span(3, 7, SpanKind::Strong)])]);
        assert!(output.contains("😀 <strong>bold</strong>"), "{output}");
    }

    #[test]
    fn out_of_range_spans_are_clamped() {
        let output = as_html(&[with_spans("short", vec![span(2, 99, SpanKind::Em)])]);
        assert_eq!(output, "<p>sh<em>ort</em></p>\n");
    }

    #[test]
    fn renders_hyperlink_with_target_and_escaped_url() {
        let mut link = span(0, 4, SpanKind::Hyperlink);
        link.data = Some(SpanData {
            url: Some("https://example.com/?a=1&b=2".to_string()),
            target: Some("_blank".to_string()),
            ..SpanData::default()
        });
        let output = as_html(&[with_spans("docs here", vec![link])]);
        assert!(output.contains(
            "<a href=\"https://example.com/?a=1&amp;b=2\" target=\"_blank\" rel=\"noopener\">docs</a> here"
        ), "{output}");
    }

    #[test]
    fn document_links_resolve_to_post_pages() {
        let mut link = span(0, 4, SpanKind::Hyperlink);
        link.data = Some(SpanData {
            uid: Some("hello-world".to_string()),
            ..SpanData::default()
        });
        let output = as_html(&[with_spans("next", vec![link])]);
        assert!(output.contains("<a href=\"/post/hello-world\">next</a>"), "{output}");
    }

    #[test]
    fn groups_consecutive_list_items() {
        let output = as_html(&[
            block(BlockKind::ListItem, "one"),
            block(BlockKind::ListItem, "two"),
            block(BlockKind::OListItem, "first"),
            RichTextBlock::paragraph("after"),
        ]);
        assert_eq!(output.matches("<ul>").count(), 1);
        assert_eq!(output.matches("<ol>").count(), 1);
        assert_eq!(output.matches("<li>").count(), 3);
        let ul_end = output.find("</ul>").unwrap();
        let ol_start = output.find("<ol>").unwrap();
        let paragraph = output.find("<p>after</p>").unwrap();
        assert!(ul_end < ol_start && ol_start < paragraph, "{output}");
    }

    #[test]
    fn renders_headings_and_preformatted() {
        let output = as_html(&[
            block(BlockKind::Heading2, "Title"),
            block(BlockKind::Preformatted, "let x = 1;"),
        ]);
        assert!(output.contains("<h2>Title</h2>"), "{output}");
        assert!(output.contains("<pre>let x = 1;</pre>"), "{output}");
    }

    #[test]
    fn renders_image_blocks() {
        let image = RichTextBlock {
            kind: BlockKind::Image,
            url: Some("https://images.prismic.io/cat.png".to_string()),
            alt: Some("a cat".to_string()),
            ..RichTextBlock::paragraph("")
        };
        let output = as_html(&[image]);
        assert!(output.contains("<p class=\"block-img\"><img src=\"https://images.prismic.io/cat.png\" alt=\"a cat\" />"), "{output}");
    }

    #[test]
    fn newlines_become_line_breaks() {
        let output = as_html(&[RichTextBlock::paragraph("line one\nline two")]);
        assert!(output.contains("line one<br />"), "{output}");
        assert!(output.contains("line two"), "{output}");
    }

    #[test]
    fn escapes_text() {
        let output = as_html(&[RichTextBlock::paragraph("<script>alert(1)</script>")]);
        assert!(!output.contains("<script>"));
        assert!(output.contains("&lt;script&gt;"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let body = vec![
            with_spans("abcdef", vec![span(0, 4, SpanKind::Strong), span(2, 6, SpanKind::Em)]),
            block(BlockKind::ListItem, "item"),
        ];
        assert_eq!(as_html(&body), as_html(&body));
    }

    #[test]
    fn as_text_joins_blocks_with_spaces() {
        let body = vec![
            RichTextBlock::paragraph("first block"),
            RichTextBlock::paragraph("second"),
        ];
        assert_eq!(as_text(&body), "first block second");
        assert_eq!(as_text(&[]), "");
    }

    #[test]
    fn deserializes_prismic_json_and_skips_unknown_blocks() {
        let json = r#"[
            {"type": "paragraph", "text": "Hi there", "spans": [{"start": 0, "end": 2, "type": "strong"}]},
            {"type": "heading3", "text": "Sub", "spans": []},
            {"type": "mystery-block", "text": "???", "spans": null},
            {"type": "image", "url": "https://img/x.png", "alt": null, "dimensions": {"width": 1, "height": 1}}
        ]"#;
        let body: RichText = serde_json::from_str(json).unwrap();
        assert_eq!(body.len(), 4);
        assert_eq!(body[0].spans[0].kind, SpanKind::Strong);
        assert_eq!(body[2].kind, BlockKind::Unknown);

        let output = as_html(&body);
        assert!(output.contains("<p><strong>Hi</strong> there</p>"), "{output}");
        assert!(output.contains("<h3>Sub</h3>"), "{output}");
        assert!(!output.contains("???"));
        assert!(output.contains("https://img/x.png"));
    }
}
