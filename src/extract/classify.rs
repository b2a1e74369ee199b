//! Textual component classification.
//!
//! Tags are heuristic and overlapping: one file may be an API surface, a
//! backend module and an entry point at once.

use lazy_static::lazy_static;
use phf::phf_set;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    // from fastapi import FastAPI / import flask
    static ref API_IMPORT_RE: Regex =
        Regex::new(r"(?m)^\s*(?:from|import)\s+(?:fastapi|flask|starlette)\b").unwrap();
    // @app.route("/"), @router.get("/items")
    static ref ROUTE_DECORATOR_RE: Regex = Regex::new(
        r"(?m)^\s*@\s*[A-Za-z_][\w.]*\.(?:route|get|post|put|delete|patch|websocket)\s*\("
    )
    .unwrap();
    static ref API_CALL_RE: Regex = Regex::new(r"(?m)\bAPIRouter\s*\(|^\s*urlpatterns\s*=").unwrap();

    static ref MODEL_IMPORT_RE: Regex =
        Regex::new(r"(?m)^\s*(?:from|import)\s+(?:sqlalchemy|django\.db|peewee|sqlmodel)\b").unwrap();
    static ref MODEL_MARKER_RE: Regex =
        Regex::new(r"\bmodels\.Model\b|\bdeclarative_base\s*\(|\bDeclarativeBase\b|\bSQLModel\b").unwrap();
}

static BACKEND_SEGMENTS: phf::Set<&'static str> = phf_set! {
    "backend",
    "server",
    "api",
};

static FRONTEND_SEGMENTS: phf::Set<&'static str> = phf_set! {
    "frontend",
    "client",
    "web",
    "ui",
};

/// File names (lowercased) that mark an entry point.
static ENTRY_POINT_NAMES: phf::Set<&'static str> = phf_set! {
    "main.py",
    "app.py",
    "wsgi.py",
    "asgi.py",
    "manage.py",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentTag {
    ApiSurface,
    DataModel,
    BackendModule,
    FrontendModule,
    EntryPoint,
}

/// Classify one source file. `path` is relative to the repository root and
/// `/`-separated.
pub fn classify(path: &str, text: &str) -> Vec<ComponentTag> {
    let mut tags = Vec::new();

    if API_IMPORT_RE.is_match(text) || ROUTE_DECORATOR_RE.is_match(text) || API_CALL_RE.is_match(text) {
        tags.push(ComponentTag::ApiSurface);
    }
    if MODEL_IMPORT_RE.is_match(text) || MODEL_MARKER_RE.is_match(text) {
        tags.push(ComponentTag::DataModel);
    }

    let segments = directory_segments(path);
    if segments.iter().any(|s| BACKEND_SEGMENTS.contains(*s)) {
        tags.push(ComponentTag::BackendModule);
    }
    if segments.iter().any(|s| FRONTEND_SEGMENTS.contains(*s)) {
        tags.push(ComponentTag::FrontendModule);
    }
    if is_entry_point(path) {
        tags.push(ComponentTag::EntryPoint);
    }

    tags
}

/// Whether the file name is one of the conventional entry-point names.
pub fn is_entry_point(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path).to_lowercase();
    ENTRY_POINT_NAMES.contains(name.as_str())
}

fn directory_segments(path: &str) -> Vec<&str> {
    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    segments.pop();
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_surface() {
        let fastapi = "from fastapi import FastAPI\napp = FastAPI()\n";
        assert!(classify("svc.py", fastapi).contains(&ComponentTag::ApiSurface));

        let flask_route = "@app.route('/')\ndef index():\n    return 'ok'\n";
        assert!(classify("svc.py", flask_route).contains(&ComponentTag::ApiSurface));

        let router = "router = APIRouter(prefix='/items')\n@router.get('/')\ndef list(): ...\n";
        assert!(classify("svc.py", router).contains(&ComponentTag::ApiSurface));

        let django_urls = "urlpatterns = [\n    path('', views.index),\n]\n";
        assert!(classify("urls.py", django_urls).contains(&ComponentTag::ApiSurface));

        assert!(classify("util.py", "def helper():\n    return 1\n").is_empty());
    }

    #[test]
    fn test_data_model() {
        let sqlalchemy = "from sqlalchemy import Column\nBase = declarative_base()\n";
        assert!(classify("db.py", sqlalchemy).contains(&ComponentTag::DataModel));

        let django = "from django.db import models\nclass Post(models.Model):\n    pass\n";
        assert!(classify("models.py", django).contains(&ComponentTag::DataModel));

        let sqlmodel = "class Hero(SQLModel, table=True):\n    id: int\n";
        assert!(classify("hero.py", sqlmodel).contains(&ComponentTag::DataModel));
    }

    #[test]
    fn test_path_segments() {
        let tags = classify("backend/api/routes.py", "");
        assert_eq!(tags, vec![ComponentTag::BackendModule]);

        let tags = classify("web/ui/views.py", "");
        assert_eq!(tags, vec![ComponentTag::FrontendModule]);

        // The file name itself is not a directory segment.
        assert!(classify("src/api.py", "").is_empty());
    }

    #[test]
    fn test_entry_points() {
        assert!(is_entry_point("main.py"));
        assert!(is_entry_point("project/Manage.py"));
        assert!(is_entry_point("server/wsgi.py"));
        assert!(!is_entry_point("main.rs"));
        assert!(!is_entry_point("domain.py"));
    }

    #[test]
    fn test_tags_overlap() {
        let text = "from fastapi import FastAPI\nfrom sqlalchemy import Column\n";
        let tags = classify("server/main.py", text);
        assert_eq!(
            tags,
            vec![
                ComponentTag::ApiSurface,
                ComponentTag::DataModel,
                ComponentTag::BackendModule,
                ComponentTag::EntryPoint,
            ]
        );
    }
}
