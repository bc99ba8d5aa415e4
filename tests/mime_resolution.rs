use mailparse::parse_mail;

use quickmail::charset::CharsetRegistry;
use quickmail::errors::ContentError;
use quickmail::mime::{BodyKind, ContentResolver, MimeNode};
use quickmail::sanitize::AmmoniaSanitizer;

fn resolve(raw: &str) -> Result<(String, BodyKind), ContentError> {
    let parsed = parse_mail(raw.as_bytes()).expect("parse_mail");
    let tree = MimeNode::from_parsed(&parsed);
    let charsets = CharsetRegistry::with_defaults();
    ContentResolver::new(&charsets, &AmmoniaSanitizer)
        .resolve(&tree)
        .map(|r| (r.body, r.kind))
}

#[test]
fn unsupported_charset_does_not_hide_sibling() {
    let raw = concat!(
        "Subject: test\r\n",
        "Content-Type: multipart/mixed; boundary=\"b\"\r\n",
        "\r\n",
        "--b\r\n",
        "Content-Type: text/plain; charset=x-bogus\r\n",
        "\r\n",
        "unreadable\r\n",
        "--b\r\n",
        "Content-Type: text/plain; charset=ISO-8859-1\r\n",
        "Content-Transfer-Encoding: quoted-printable\r\n",
        "\r\n",
        "caf=E9\r\n",
        "--b--\r\n",
    );

    let (body, kind) = resolve(raw).unwrap();
    assert_eq!(kind, BodyKind::Plain);
    assert!(body.starts_with("caf\u{e9}"));
}

#[test]
fn nested_html_alternative_wins_over_plain_sibling() {
    let raw = concat!(
        "Content-Type: multipart/mixed; boundary=\"outer\"\r\n",
        "\r\n",
        "--outer\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "preface\r\n",
        "--outer\r\n",
        "Content-Type: multipart/alternative; boundary=\"inner\"\r\n",
        "\r\n",
        "--inner\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "plain\r\n",
        "--inner\r\n",
        "Content-Type: text/html; charset=utf-8\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "PGI+aGk8L2I+\r\n",
        "--inner--\r\n",
        "--outer\r\n",
        "Content-Type: application/pdf; name=\"file.pdf\"\r\n",
        "Content-Disposition: attachment; filename=\"file.pdf\"\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "SGVsbG8=\r\n",
        "--outer--\r\n",
    );

    let (body, kind) = resolve(raw).unwrap();
    assert_eq!(kind, BodyKind::Html);
    assert_eq!(body, "<b>hi</b>");
}

#[test]
fn only_unsupported_parts_reports_the_charset() {
    let raw = concat!(
        "Content-Type: multipart/mixed; boundary=\"b\"\r\n",
        "\r\n",
        "--b\r\n",
        "Content-Type: text/html; charset=x-bogus\r\n",
        "\r\n",
        "<p>x</p>\r\n",
        "--b--\r\n",
    );

    assert_eq!(
        resolve(raw).unwrap_err(),
        ContentError::UnsupportedCharset("x-bogus".into())
    );
}

#[test]
fn multipart_without_boundary_is_rejected() {
    let raw = concat!(
        "Content-Type: multipart/mixed\r\n",
        "\r\n",
        "no parts here\r\n",
    );

    assert_eq!(resolve(raw).unwrap_err(), ContentError::MissingBoundary);
}

#[test]
fn attachment_only_message_has_nothing_to_show() {
    let raw = concat!(
        "Content-Type: multipart/mixed; boundary=\"b\"\r\n",
        "\r\n",
        "--b\r\n",
        "Content-Type: image/png\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "iVBORw0KGgo=\r\n",
        "--b--\r\n",
    );

    assert_eq!(resolve(raw).unwrap_err(), ContentError::NoDisplayableContent);
}
