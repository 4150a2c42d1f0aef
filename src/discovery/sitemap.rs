//! Streaming sitemap parser
//!
//! Handles both `<urlset>` documents and `<sitemapindex>` documents. The
//! reader never builds a DOM, so very large sitemaps stay cheap.

use quick_xml::events::Event;
use quick_xml::Reader;

/// The `<loc>` values of one sitemap document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SitemapDocument {
    /// `<url><loc>` entries: candidate page URLs
    pub urls: Vec<String>,

    /// `<sitemap><loc>` entries: nested sitemaps of an index
    pub sitemaps: Vec<String>,
}

/// Parses a sitemap XML document
///
/// # Returns
///
/// * `Ok(SitemapDocument)` - Every `<loc>` found before the end of input
/// * `Err(String)` - The document is not well-formed XML
pub fn parse_sitemap(xml: &[u8]) -> Result<SitemapDocument, String> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut document = SitemapDocument::default();
    let mut buf = Vec::new();
    let mut in_url = false;
    let mut in_sitemap = false;
    let mut in_loc = false;
    let mut current_loc = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"url" => {
                    in_url = true;
                    current_loc.clear();
                }
                b"sitemap" => {
                    in_sitemap = true;
                    current_loc.clear();
                }
                b"loc" => in_loc = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"loc" => in_loc = false,
                b"url" if in_url => {
                    if !current_loc.is_empty() {
                        document.urls.push(current_loc.clone());
                    }
                    in_url = false;
                }
                b"sitemap" if in_sitemap => {
                    if !current_loc.is_empty() {
                        document.sitemaps.push(current_loc.clone());
                    }
                    in_sitemap = false;
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_loc && (in_url || in_sitemap) => {
                let text = e.unescape().map_err(|e| format!("XML text error: {}", e))?;
                current_loc.push_str(text.trim());
            }
            Ok(Event::CData(e)) if in_loc && (in_url || in_sitemap) => {
                current_loc.push_str(String::from_utf8_lossy(e.as_ref()).trim());
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "XML parse error at position {}: {}",
                    reader.buffer_position(),
                    e
                ));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(document)
}
