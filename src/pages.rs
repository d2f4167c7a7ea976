use htmlescape::encode_minimal;

use crate::cms::Cursor;
use crate::dates::{format_publication_date, DateLocale};
use crate::models::{PostDetail, PostSummary};
use crate::pagination::PostListing;
use crate::rich_text::as_html;
use crate::state::Templates;

const HOT_RELOAD_SCRIPT: &str = r#"
<script>
    const socket = new WebSocket("ws://" + window.location.host + "/ws");
    socket.onmessage = (event) => {
        if (event.data === "reload") {
            window.location.reload();
        }
    };
</script>
"#;

const LOAD_MORE_SCRIPT: &str = r#"
<script>
    document.addEventListener("click", async (event) => {
        const button = event.target.closest("button[data-next-page]");
        if (!button || button.disabled) {
            return;
        }
        button.disabled = true;
        try {
            const cursor = encodeURIComponent(button.dataset.nextPage);
            const response = await fetch("/posts/more?cursor=" + cursor);
            if (!response.ok) {
                throw new Error("status " + response.status);
            }
            const page = await response.json();
            document.getElementById("posts").insertAdjacentHTML("beforeend", page.html);
            if (page.next_page) {
                button.dataset.nextPage = page.next_page;
                button.disabled = false;
            } else {
                button.remove();
            }
        } catch (err) {
            console.error("Failed to load more posts", err);
            button.disabled = false;
        }
    });
</script>
"#;

const REFRESH_META: &str = r#"<meta http-equiv="refresh" content="1">"#;

/// Page chrome shared by every view.
pub struct Page<'a> {
    pub title: &'a str,
    pub head: &'a str,
    pub content: &'a str,
}

pub fn render_with_layout(
    templates: &Templates,
    page: Page<'_>,
    locale: DateLocale,
    is_development: bool,
) -> String {
    let title = encode_minimal(page.title);
    let mut html = fill_placeholders(
        &templates.layout,
        &[
            ("{{ lang }}", locale.html_lang()),
            ("{{ title }}", &title),
            ("{{ head }}", page.head),
            ("{{ header }}", &templates.header),
            ("{{ content }}", page.content),
        ],
    );

    if is_development {
        if let Some(end) = html.rfind("</body>") {
            html.insert_str(end, HOT_RELOAD_SCRIPT);
        }
    }

    html
}

/// Substitutes placeholders in a single pass; inserted values are never rescanned.
fn fill_placeholders(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    loop {
        let next = values
            .iter()
            .filter_map(|(key, value)| rest.find(key).map(|at| (at, *key, *value)))
            .min_by_key(|(at, _, _)| *at);
        match next {
            Some((at, key, value)) => {
                out.push_str(&rest[..at]);
                out.push_str(value);
                rest = &rest[at + key.len()..];
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}

fn render_date(post_date: Option<&chrono::DateTime<chrono::FixedOffset>>, locale: DateLocale) -> String {
    match post_date {
        Some(date) => format!(
            "<time datetime=\"{}\">{}</time>",
            date.to_rfc3339(),
            format_publication_date(date, locale)
        ),
        None => "<time></time>".to_string(),
    }
}

/// List items for `posts`; also the payload of "load more" responses.
pub fn render_post_items(posts: &[PostSummary], locale: DateLocale) -> String {
    let mut items = String::new();
    for post in posts {
        let summary = format!(
            "<strong>{}</strong><p>{}</p><div class=\"info\">{}<span class=\"author\">{}</span></div>",
            encode_minimal(&post.title),
            encode_minimal(&post.subtitle),
            render_date(post.publication_date.as_ref(), locale),
            encode_minimal(&post.author),
        );
        match &post.id {
            Some(uid) => items.push_str(&format!(
                "<li class=\"post\"><a href=\"/post/{}\">{}</a></li>",
                encode_minimal(uid),
                summary
            )),
            None => items.push_str(&format!("<li class=\"post\">{}</li>", summary)),
        }
    }
    items
}

fn render_load_more(next_page: Option<&Cursor>) -> String {
    match next_page {
        Some(cursor) => format!(
            "<button type=\"button\" class=\"load-more\" data-next-page=\"{}\">Carregar mais posts</button>{}",
            encode_minimal(cursor.as_str()),
            LOAD_MORE_SCRIPT
        ),
        None => String::new(),
    }
}

pub fn render_home(listing: &PostListing, locale: DateLocale) -> String {
    format!(
        "<ul id=\"posts\" class=\"posts\">{}</ul>{}",
        render_post_items(listing.posts(), locale),
        render_load_more(listing.next_page())
    )
}

pub fn render_post(post: &PostDetail, locale: DateLocale) -> String {
    let banner = post
        .banner
        .as_ref()
        .map(|banner| {
            format!(
                "<img class=\"banner\" src=\"{}\" alt=\"{}\" />",
                encode_minimal(&banner.url),
                encode_minimal(banner.alt.as_deref().unwrap_or("banner"))
            )
        })
        .unwrap_or_default();

    let mut sections = String::new();
    for block in &post.content {
        sections.push_str(&format!(
            "<section class=\"content-part\"><h2>{}</h2><div class=\"body\">{}</div></section>",
            encode_minimal(&block.heading),
            as_html(&block.body)
        ));
    }

    format!(
        "{}<article class=\"post\"><h1>{}</h1><div class=\"info\">{}<span class=\"author\">{}</span><span class=\"reading-time\">{} min</span></div>{}</article>",
        banner,
        encode_minimal(&post.title),
        render_date(post.publication_date.as_ref(), locale),
        encode_minimal(&post.author),
        post.reading_time(),
        sections
    )
}

/// Placeholder shown while a post is resolved; reloads itself until it is ready.
pub fn loading_page(templates: &Templates, locale: DateLocale, is_development: bool) -> String {
    render_with_layout(
        templates,
        Page {
            title: "Carregando...",
            head: REFRESH_META,
            content: &templates.loading,
        },
        locale,
        is_development,
    )
}

pub fn not_found_page(templates: &Templates, slug: &str, locale: DateLocale, is_development: bool) -> String {
    let body = templates.not_found.replace("{{slug}}", &encode_minimal(slug));
    render_with_layout(
        templates,
        Page {
            title: "Not found",
            head: "",
            content: &body,
        },
        locale,
        is_development,
    )
}
