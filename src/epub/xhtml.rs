//! XHTML serialization of parsed HTML fragments.
//!
//! Chapter files are `application/xhtml+xml`, so their bodies must be well-formed XML:
//! void elements are self-closed, text is escaped with the five XML entities only
//! (HTML named entities such as `&nbsp;` are already decoded by the parser and come out
//! as the literal character), and attribute order follows the source.

use scraper::{ElementRef, Html, Node};

const SVG_NS: &str = "http://www.w3.org/2000/svg";
const MATHML_NS: &str = "http://www.w3.org/1998/Math/MathML";
const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Serialize the children of a fragment's root (no `<html>` wrapper) as XHTML.
pub fn fragment_to_xhtml(fragment: &Html) -> String {
    let mut out = String::new();
    write_children(fragment.root_element(), &mut out);
    out
}

fn write_children(parent: ElementRef<'_>, out: &mut String) {
    for child in parent.children() {
        match child.value() {
            Node::Text(text) => push_escaped(out, text, false),
            Node::Comment(comment) => write_comment(comment, out),
            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(child) {
                    write_element(element, out);
                }
            }
            _ => {}
        }
    }
}

fn write_element(element: ElementRef<'_>, out: &mut String) {
    let value = element.value();
    let name = value.name();

    let attrs: Vec<(String, &str)> = value
        .attrs
        .iter()
        .map(|(qual, v)| {
            let key = match &qual.prefix {
                Some(prefix) => format!("{}:{}", prefix, qual.local),
                None => qual.local.to_string(),
            };
            (key, &**v)
        })
        .collect();

    out.push('<');
    out.push_str(name);
    // Foreign content needs its namespace declared once it leaves the HTML parser.
    let declared = |key: &str| attrs.iter().any(|(k, _)| k == key);
    match name {
        "svg" => {
            if !declared("xmlns") {
                push_attr(out, "xmlns", SVG_NS);
            }
            if !declared("xmlns:xlink") && uses_xlink(element) {
                push_attr(out, "xmlns:xlink", XLINK_NS);
            }
        }
        "math" if !declared("xmlns") => push_attr(out, "xmlns", MATHML_NS),
        _ => {}
    }
    for (key, v) in &attrs {
        push_attr(out, key, v);
    }

    if VOID_ELEMENTS.contains(&name) {
        out.push_str("/>");
        return;
    }
    out.push('>');
    write_children(element, out);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn uses_xlink(svg: ElementRef<'_>) -> bool {
    svg.descendants()
        .filter_map(|node| node.value().as_element())
        .any(|el| el.attrs.iter().any(|(qual, _)| qual.prefix.as_deref() == Some("xlink")))
}

fn write_comment(comment: &str, out: &mut String) {
    // "--" is not allowed inside an XML comment.
    let body = comment.replace("--", "- -");
    out.push_str("<!--");
    out.push_str(&body);
    if body.ends_with('-') {
        out.push(' ');
    }
    out.push_str("-->");
}

fn push_attr(out: &mut String, key: &str, value: &str) {
    out.push(' ');
    out.push_str(key);
    out.push_str("=\"");
    push_escaped(out, value, true);
    out.push('"');
}

/// Escape for XML and drop characters XML 1.0 cannot carry.
fn push_escaped(out: &mut String, s: &str, in_attr: bool) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attr => out.push_str("&quot;"),
            '\t' | '\n' | '\r' => out.push(c),
            c if (c as u32) < 0x20 || c == '\u{FFFE}' || c == '\u{FFFF}' => {}
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xhtml(html: &str) -> String {
        fragment_to_xhtml(&Html::parse_fragment(html))
    }

    #[test]
    fn void_elements_are_self_closed() {
        assert_eq!(
            xhtml("<p>a<br>b</p><img src=\"x.png\" alt=\"\"><hr>"),
            "<p>a<br/>b</p><img src=\"x.png\" alt=\"\"/><hr/>"
        );
    }

    #[test]
    fn named_entities_become_characters() {
        assert_eq!(
            xhtml("<p>b&nbsp;c &copy; &amp; &lt;x&gt;</p>"),
            "<p>b\u{a0}c \u{a9} &amp; &lt;x&gt;</p>"
        );
    }

    #[test]
    fn attributes_keep_source_order_and_are_escaped() {
        assert_eq!(
            xhtml(r#"<a title="say &quot;hi&quot; &amp; go" href="x?a=1&amp;b=2" class="c">t</a>"#),
            r#"<a title="say &quot;hi&quot; &amp; go" href="x?a=1&amp;b=2" class="c">t</a>"#
        );
    }

    #[test]
    fn unclosed_markup_is_balanced() {
        assert_eq!(xhtml("<p>one<p>two<em>three"), "<p>one</p><p>two<em>three</em></p>");
    }

    #[test]
    fn svg_gets_namespace_declarations() {
        let out = xhtml(r#"<svg width="10"><image xlink:href="a.png"></image></svg>"#);
        assert!(out.starts_with(
            r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="10">"#
        ));
        assert!(out.contains(r#"<image xlink:href="a.png"></image>"#));
    }

    #[test]
    fn comments_stay_well_formed() {
        assert_eq!(xhtml("<!-- a -- b -->x"), "<!-- a - - b -->x");
    }

    #[test]
    fn output_is_a_fixed_point() {
        let once = xhtml("<div id=\"d\" class=\"c\"><br>x&nbsp;y<img alt=\"a\" src=\"s\"></div>");
        assert_eq!(xhtml(&once), once);
    }
}
