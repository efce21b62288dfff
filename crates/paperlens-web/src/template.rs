use axum::response::Html;

const INDEX_HTML: &str = include_str!("../templates/index.html");

/// Render the index page, injecting the active model and field count.
pub fn render_index(model: &str, field_count: usize) -> Html<String> {
    let html = INDEX_HTML
        .replace("{{ model }}", model)
        .replace("{{ field_count }}", &field_count.to_string());
    Html(html)
}
