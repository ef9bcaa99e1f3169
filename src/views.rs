//! Server-rendered pages. Plain string building; every interpolated value goes
//! through `escape`.

use uuid::Uuid;

use crate::models::{Project, ProjectDraft};

const SITE_NAME: &str = "Diego Espinosa";

/// Escapes text for use in element content and double-quoted attributes.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, signed_in: bool, body: &str) -> String {
    format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
</head>
<body class="min-h-screen bg-gray-50">
{header}
<main>
{body}
</main>
</body>
</html>
"#,
        title = escape(title),
        header = header(signed_in),
    )
}

/// Site header. The sign-out control only shows for a signed-in visitor.
fn header(signed_in: bool) -> String {
    let session_control = if signed_in {
        r#"<form method="post" action="/logout" class="inline"><button type="submit">Sign out</button></form>"#
    } else {
        ""
    };
    format!(
        r#"<header class="bg-white shadow-sm">
<a href="/" class="brand">{SITE_NAME}</a>
<nav>
<a href="/">Portfolio</a>
<a href="/manage">Manage Projects</a>
{session_control}
</nav>
</header>"#
    )
}

pub fn project_card(project: &Project) -> String {
    let link_kind = if project.is_github() { "github" } else { "external" };
    format!(
        r#"<article class="project-card">
<img src="{image}" alt="{title}">
<h3>{title}</h3>
<p>{description}</p>
<a href="{url}" target="_blank" rel="noopener noreferrer" class="link-{link_kind}">View Project</a>
</article>"#,
        image = escape(&project.image_url),
        title = escape(&project.title),
        description = escape(&project.description),
        url = escape(&project.url),
    )
}

pub fn gallery_page(projects: &[Project], signed_in: bool) -> String {
    let mut body = String::from(
        r#"<section class="hero">
<h1>Full Stack Web Developer</h1>
<p>Specialized in JavaScript (React, Node.js/Express), AWS Services, Google Cloud, PostgreSQL, and Linux servers. Building robust and scalable web applications.</p>
</section>
<div class="grid">
"#,
    );
    for project in projects {
        body.push_str(&project_card(project));
        body.push('\n');
    }
    body.push_str("</div>");
    layout("Portfolio", signed_in, &body)
}

/// ManageView
///
/// State of the management screen for one render.
#[derive(Debug, Default)]
pub struct ManageView<'a> {
    pub projects: &'a [Project],
    pub draft: ProjectDraft,
    pub editing_id: Option<Uuid>,
    pub notice: Option<String>,
}

pub fn manage_page(view: &ManageView<'_>) -> String {
    let editing = view.editing_id.is_some();
    let mut body = String::new();

    body.push_str(&format!(
        r#"<section class="editor">
<h2>{heading}</h2>
"#,
        heading = if editing { "Edit Project" } else { "Add New Project" },
    ));
    if let Some(notice) = &view.notice {
        body.push_str(&format!("<p class=\"notice\">{}</p>\n", escape(notice)));
    }
    body.push_str(&format!(
        r#"<form method="post" action="/manage">
<input type="hidden" name="editing_id" value="{editing_id}">
<label>Title <input type="text" name="title" value="{title}" required></label>
<label>Description <textarea name="description" rows="3" required>{description}</textarea></label>
<label>URL <input type="url" name="url" value="{url}" required></label>
<label>Image URL <input type="url" name="image_url" value="{image_url}" required></label>
{cancel}<button type="submit">{submit}</button>
</form>
</section>
"#,
        editing_id = view.editing_id.map(|id| id.to_string()).unwrap_or_default(),
        title = escape(&view.draft.title),
        description = escape(&view.draft.description),
        url = escape(&view.draft.url),
        image_url = escape(&view.draft.image_url),
        cancel = if editing {
            r#"<a href="/manage" class="cancel">Cancel</a> "#
        } else {
            ""
        },
        submit = if editing { "Update Project" } else { "Add Project" },
    ));

    body.push_str(
        r#"<table>
<thead><tr><th>Project</th><th>Description</th><th>Actions</th></tr></thead>
<tbody>
"#,
    );
    for project in view.projects {
        body.push_str(&format!(
            r#"<tr><td><div>{title}</div><div>{url}</div></td><td>{description}</td><td><a href="/manage?edit={id}">Edit</a> <a href="/manage/projects/{id}/delete">Delete</a></td></tr>"#,
            title = escape(&project.title),
            url = escape(&project.url),
            description = escape(&project.description),
            id = project.id,
        ));
        body.push('\n');
    }
    body.push_str("</tbody>\n</table>");

    layout("Manage Projects", true, &body)
}

pub fn confirm_delete_page(project: &Project) -> String {
    let body = format!(
        r#"<section class="confirm">
<p>Are you sure you want to delete this project?</p>
<p><strong>{title}</strong></p>
<form method="post" action="/manage/projects/{id}/delete">
<a href="/manage">Cancel</a> <button type="submit">Delete</button>
</form>
</section>"#,
        title = escape(&project.title),
        id = project.id,
    );
    layout("Delete Project", true, &body)
}

/// Placeholder while a sign-in is being completed; reloads until the state settles.
pub fn spinner_page() -> String {
    r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta http-equiv="refresh" content="1">
<title>Signing in…</title>
</head>
<body class="min-h-screen">
<div class="spinner" role="status" aria-label="Loading"></div>
</body>
</html>
"#
    .to_string()
}
