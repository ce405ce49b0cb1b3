use super::handlers::{auth, health};
use utoipa::openapi::{
    security::{Http, HttpAuthScheme, SecurityScheme},
    Components, Contact, Info, License, OpenApi, Tag,
};
use utoipa_axum::{router::OpenApiRouter, routes};

pub const BEARER_SCHEME: &str = "bearer_access_token";

#[must_use]
pub fn openapi() -> OpenApi {
    api_router().split_for_parts().1
}

/// Every served route that belongs in the document is registered here.
/// `OPTIONS /health` is added by the caller and stays undocumented.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(base_document())
        .routes(routes!(health::health))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::refresh::refresh))
        .routes(routes!(auth::logout::logout))
        .routes(routes!(auth::me::me));

    let document = router.get_openapi_mut();
    document.tags = Some(vec![
        tag("health", "Service liveness and storage status"),
        tag("auth", "Login, token refresh and logout"),
    ]);
    document
        .components
        .get_or_insert_with(Components::new)
        .add_security_scheme(
            BEARER_SCHEME,
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );

    router
}

fn tag(name: &str, description: &str) -> Tag {
    let mut tag = Tag::new(name);
    tag.description = Some(description.to_string());
    tag
}

fn base_document() -> OpenApi {
    let mut info = Info::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info.description = present(env!("CARGO_PKG_DESCRIPTION")).map(str::to_string);
    // Only the first of the `;` separated Cargo authors becomes the contact.
    info.contact = env!("CARGO_PKG_AUTHORS")
        .split(';')
        .next()
        .and_then(author_contact);
    info.license = present(env!("CARGO_PKG_LICENSE")).map(|spdx| {
        let mut license = License::new(spdx);
        license.identifier = Some(spdx.to_string());
        license
    });
    OpenApi::new(info, utoipa::openapi::Paths::new())
}

fn present(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|value| !value.is_empty())
}

/// `Name <email>`, `Name`, or `<email>`.
fn author_contact(author: &str) -> Option<Contact> {
    let (name, email) = match author.split_once('<') {
        Some((name, email)) => (present(name), present(email.trim_end_matches(['>', ' ']))),
        None => (present(author), None),
    };
    if name.is_none() && email.is_none() {
        return None;
    }
    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_comes_from_cargo_metadata() {
        let info = openapi().info;
        assert_eq!(info.title, "authkeep");
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(
            info.contact.and_then(|contact| contact.email),
            Some("team@authkeep.dev".to_string())
        );
        assert_eq!(
            info.license.map(|license| license.name),
            Some("BSD-3-Clause".to_string())
        );
    }

    #[test]
    fn documents_auth_routes_and_bearer_scheme() {
        let document = openapi();
        for path in [
            "/health",
            "/v1/auth/login",
            "/v1/auth/refresh",
            "/v1/auth/logout",
            "/v1/auth/me",
        ] {
            assert!(document.paths.paths.contains_key(path), "missing {path}");
        }
        let schemes = document
            .components
            .map(|components| components.security_schemes)
            .unwrap_or_default();
        assert!(schemes.contains_key(BEARER_SCHEME));
    }

    #[test]
    fn author_contact_variants() {
        let contact = author_contact("Jane Doe <jane@example.com>");
        assert_eq!(
            contact.map(|c| (c.name, c.email)),
            Some((Some("Jane Doe".to_string()), Some("jane@example.com".to_string())))
        );
        let contact = author_contact(" <jane@example.com> ");
        assert_eq!(
            contact.map(|c| (c.name, c.email)),
            Some((None, Some("jane@example.com".to_string())))
        );
        assert!(author_contact("  ").is_none());
    }
}
