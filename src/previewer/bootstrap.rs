//! Preview document generation: player detection, runtime bootstrap script,
//! rebuilt document and the exported script text.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use super::runtime::LayoutDocument;
use crate::entities::{Media, MediaId};

lazy_static! {
    static ref PLAYER_URL: Regex =
        Regex::new(r"(?:http://www\.|http://|www\.|\.|^)(youtu|vimeo|soundcloud|baseplayer)")
            .expect("player url pattern");
}

/// Player wrapper chosen from the media URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerKind {
    YouTube,
    Vimeo,
    SoundCloud,
    BasePlayer,
    Html5,
}

impl PlayerKind {
    pub fn detect(url: &str) -> Self {
        match PLAYER_URL.captures(url).and_then(|c| c.get(1)).map(|m| m.as_str()) {
            Some("youtu") => PlayerKind::YouTube,
            Some("vimeo") => PlayerKind::Vimeo,
            Some("soundcloud") => PlayerKind::SoundCloud,
            Some("baseplayer") => PlayerKind::BasePlayer,
            _ => PlayerKind::Html5,
        }
    }
}

/// Page-global variable holding the runtime of `media`.
pub fn runtime_var(media: MediaId) -> String {
    format!("popcorn{}", media.get())
}

/// JS string literal.
fn js(s: &str) -> String {
    Value::from(s).to_string()
}

/// Statement constructing the runtime of `media`. The media name is the id
/// of the layout element hosting the player. `None` without a source.
pub fn constructor(media: &Media) -> Option<String> {
    let url = media.source()?;
    let var = runtime_var(media.id());
    let target = media.name();
    let line = match PlayerKind::detect(url) {
        PlayerKind::YouTube => format!(
            "{} = Popcorn( Popcorn.youtube( {}, {}, {{ width: 430, height: 300 }} ) );\n",
            var,
            js(target),
            js(url)
        ),
        PlayerKind::Vimeo => format!(
            "{} = Popcorn( Popcorn.vimeo( {}, {}, {{ css: {{ width: '430px', height: '300px' }} }} ) );\n",
            var,
            js(target),
            js(url)
        ),
        PlayerKind::SoundCloud => {
            format!("{} = Popcorn( Popcorn.soundcloud( {}, {} ) );\n", var, js(target), js(url))
        }
        PlayerKind::BasePlayer => format!("{} = Popcorn( Popcorn.baseplayer( {} ) );\n", var, js(target)),
        PlayerKind::Html5 => {
            let video_id = format!("{}-butter", target);
            format!(
                "(function () {{\n\
                 var video = document.createElement( 'video' ), src = document.createElement( 'source' );\n\
                 src.src = {url};\n\
                 video.id = {vid};\n\
                 video.controls = true;\n\
                 video.appendChild( src );\n\
                 document.getElementById( {target} ).appendChild( video );\n\
                 }})();\n\
                 {var} = Popcorn( {sel} );\n",
                url = js(url),
                vid = js(&video_id),
                target = js(target),
                var = var,
                sel = js(&format!("#{}", video_id)),
            )
        }
    };
    Some(line)
}

/// Script constructing one runtime per media, run on `DOMContentLoaded`.
pub fn bootstrap_script(medias: &[Media]) -> String {
    let mut script = String::from("document.addEventListener('DOMContentLoaded', function () {\n");
    for media in medias {
        match constructor(media) {
            Some(line) => script.push_str(&line),
            None => log::debug!("bootstrap: {} has no source, no runtime", media.id()),
        }
    }
    script.push_str("}, false);");
    script
}

/// Full preview document: original head, runtime library, bootstrap, original body.
pub fn document_html(original: &LayoutDocument, popcorn_url: &str, script: &str) -> String {
    format!(
        "<html>\n<head>{}\n<script src={}></script>\n<script>\n{}</script>\n</head>\n<body>{}</body>\n</html>",
        original.head_html,
        js(popcorn_url),
        script,
        original.body_html
    )
}

/// Readable script reproducing the presentation: runtime construction plus
/// one plugin call per track event of every media.
pub fn export_script(medias: &[Media]) -> String {
    let mut out = String::new();
    for media in medias {
        if let Some(line) = constructor(media) {
            out.push_str("var ");
            out.push_str(&line);
        }
    }
    for media in medias {
        let var = runtime_var(media.id());
        for track in media.tracks() {
            for event in track.track_events() {
                out.push_str(&format!("{}.{}({{\n", var, event.plugin_type));
                for (key, value) in event.runtime_options() {
                    out.push_str(&format!("  {}: {},\n", key, value));
                }
                out.push_str("});\n");
            }
        }
    }
    out
}
