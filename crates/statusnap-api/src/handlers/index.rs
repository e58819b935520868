use crate::state::AppState;
use crate::views::Page;
use axum::{extract::State, response::Html};
use std::sync::Arc;

/// The upload form.
pub async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(Page::form(state.form_limits()).render())
}
