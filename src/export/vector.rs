//! SVG stamps drawn as PDF vector content

/// PDF content for an SVG drawing, in a `width x height` box.
///
/// The content starts by flipping y, so drawing operators use the SVG's
/// top-left origin.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorForm {
    pub width: f32,
    pub height: f32,
    pub content: Vec<u8>,
}

/// Convert SVG source to PDF drawing operators.
///
/// Only solid-colour paths are converted. `None` for anything else (images,
/// gradients, translucency, clipping, masks, filters), which is exported as a
/// raster instead.
#[cfg(feature = "svg")]
pub fn from_svg(svg: &str) -> Option<VectorForm> {
    use std::fmt::Write as _;

    use log::debug;
    use resvg::usvg;

    let tree = match usvg::Tree::from_str(svg, &usvg::Options::default()) {
        Ok(tree) => tree,
        Err(e) => {
            debug!("SVG stamp not parsed for vector export: {e}");
            return None;
        }
    };
    let size = tree.size();
    if size.width() <= 0.0 || size.height() <= 0.0 {
        return None;
    }

    let mut content = String::new();
    let _ = writeln!(content, "1 0 0 -1 0 {:.4} cm", size.height());
    if let Err(reason) = svg_ops::write_group(tree.root(), &mut content) {
        debug!("SVG stamp exported as raster: {reason}");
        return None;
    }
    Some(VectorForm {
        width: size.width(),
        height: size.height(),
        content: content.into_bytes(),
    })
}

#[cfg(not(feature = "svg"))]
pub fn from_svg(_svg: &str) -> Option<VectorForm> {
    None
}

#[cfg(feature = "svg")]
mod svg_ops {
    use std::fmt::Write as _;

    use resvg::tiny_skia::PathSegment;
    use resvg::usvg::{self, FillRule, LineCap, LineJoin, Node, Paint};

    type Unsupported = &'static str;

    pub(super) fn write_group(group: &usvg::Group, out: &mut String) -> Result<(), Unsupported> {
        if group.clip_path().is_some() || group.mask().is_some() || !group.filters().is_empty() {
            return Err("clip path, mask or filter");
        }
        if group.opacity().get() < 1.0 {
            return Err("group opacity");
        }
        for node in group.children() {
            match node {
                Node::Group(group) => write_group(group, out)?,
                Node::Path(path) => write_path(path, out)?,
                Node::Text(text) => write_group(text.flattened(), out)?,
                Node::Image(_) => return Err("embedded image"),
            }
        }
        Ok(())
    }

    fn solid_color(paint: &Paint, opacity: f32) -> Result<[f32; 3], Unsupported> {
        if opacity < 1.0 {
            return Err("translucent paint");
        }
        match paint {
            Paint::Color(c) => Ok([
                f32::from(c.red) / 255.0,
                f32::from(c.green) / 255.0,
                f32::from(c.blue) / 255.0,
            ]),
            _ => Err("gradient or pattern paint"),
        }
    }

    fn write_path(path: &usvg::Path, out: &mut String) -> Result<(), Unsupported> {
        if !path.is_visible() {
            return Ok(());
        }
        let fill = match path.fill() {
            Some(fill) => Some((solid_color(fill.paint(), fill.opacity().get())?, fill.rule())),
            None => None,
        };
        let stroke = match path.stroke() {
            Some(stroke) => Some((solid_color(stroke.paint(), stroke.opacity().get())?, stroke)),
            None => None,
        };

        let t = path.abs_transform();
        let _ = writeln!(
            out,
            "q {:.4} {:.4} {:.4} {:.4} {:.4} {:.4} cm",
            t.sx, t.ky, t.kx, t.sy, t.tx, t.ty
        );
        if let Some(([r, g, b], _)) = fill {
            let _ = writeln!(out, "{r:.4} {g:.4} {b:.4} rg");
        }
        if let Some(([r, g, b], stroke)) = stroke {
            let cap = match stroke.linecap() {
                LineCap::Butt => 0,
                LineCap::Round => 1,
                LineCap::Square => 2,
            };
            let join = match stroke.linejoin() {
                LineJoin::Miter | LineJoin::MiterClip => 0,
                LineJoin::Round => 1,
                LineJoin::Bevel => 2,
            };
            let _ = writeln!(
                out,
                "{r:.4} {g:.4} {b:.4} RG {:.4} w {cap} J {join} j {:.4} M",
                stroke.width().get(),
                stroke.miterlimit().get()
            );
            if let Some(dashes) = stroke.dasharray() {
                let dashes: Vec<String> = dashes.iter().map(|d| format!("{d:.4}")).collect();
                let _ = writeln!(out, "[{}] {:.4} d", dashes.join(" "), stroke.dashoffset());
            }
        }

        write_segments(path.data(), out);

        let even_odd = matches!(fill, Some((_, FillRule::EvenOdd)));
        let op = match (fill.is_some(), stroke.is_some()) {
            (true, true) if even_odd => "B*",
            (true, true) => "B",
            (true, false) if even_odd => "f*",
            (true, false) => "f",
            (false, true) => "S",
            (false, false) => "n",
        };
        let _ = writeln!(out, "{op} Q");
        Ok(())
    }

    fn write_segments(data: &resvg::tiny_skia::Path, out: &mut String) {
        let mut current = (0.0, 0.0);
        let mut start = (0.0, 0.0);
        for segment in data.segments() {
            match segment {
                PathSegment::MoveTo(p) => {
                    let _ = writeln!(out, "{:.4} {:.4} m", p.x, p.y);
                    current = (p.x, p.y);
                    start = current;
                }
                PathSegment::LineTo(p) => {
                    let _ = writeln!(out, "{:.4} {:.4} l", p.x, p.y);
                    current = (p.x, p.y);
                }
                PathSegment::QuadTo(c, p) => {
                    // raise to a cubic with the same curve
                    let c1 = (
                        current.0 + 2.0 / 3.0 * (c.x - current.0),
                        current.1 + 2.0 / 3.0 * (c.y - current.1),
                    );
                    let c2 = (p.x + 2.0 / 3.0 * (c.x - p.x), p.y + 2.0 / 3.0 * (c.y - p.y));
                    let _ = writeln!(
                        out,
                        "{:.4} {:.4} {:.4} {:.4} {:.4} {:.4} c",
                        c1.0, c1.1, c2.0, c2.1, p.x, p.y
                    );
                    current = (p.x, p.y);
                }
                PathSegment::CubicTo(c1, c2, p) => {
                    let _ = writeln!(
                        out,
                        "{:.4} {:.4} {:.4} {:.4} {:.4} {:.4} c",
                        c1.x, c1.y, c2.x, c2.y, p.x, p.y
                    );
                    current = (p.x, p.y);
                }
                PathSegment::Close => {
                    let _ = writeln!(out, "h");
                    current = start;
                }
            }
        }
    }
}

#[cfg(all(test, feature = "svg"))]
mod tests {
    use super::*;
    use crate::capture::StrokePad;

    fn content(form: &VectorForm) -> String {
        String::from_utf8(form.content.clone()).unwrap()
    }

    #[test]
    fn strokes_become_round_capped_lines() {
        let mut pad = StrokePad::new(200, 100);
        pad.begin_stroke(20.0, 30.0);
        pad.extend_stroke(120.0, 30.0);
        pad.end_stroke();

        let form = from_svg(&pad.to_svg().unwrap()).unwrap();
        assert_eq!((form.width, form.height), (106.0, 6.0));
        let ops = content(&form);
        assert!(ops.starts_with("1 0 0 -1 0 6.0000 cm\n"));
        assert!(ops.contains("3.0000 w 1 J 1 j"));
        assert!(ops.contains("3.0000 3.0000 m\n103.0000 3.0000 l\n"));
        assert!(ops.contains("S Q"));
    }

    #[test]
    fn filled_shapes_keep_colour_and_rule() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="20" height="10">
            <rect x="2" y="2" width="10" height="5" fill="#ff0000" fill-rule="evenodd"/>
        </svg>"##;
        let ops = content(&from_svg(svg).unwrap());
        assert!(ops.contains("1.0000 0.0000 0.0000 rg"));
        assert!(ops.contains("h\nf* Q"));
    }

    #[test]
    fn gradients_and_translucency_fall_back_to_raster() {
        let gradient = r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10">
            <defs><linearGradient id="g"><stop offset="0" stop-color="red"/>
            <stop offset="1" stop-color="blue"/></linearGradient></defs>
            <rect width="10" height="10" fill="url(#g)"/></svg>"#;
        assert!(from_svg(gradient).is_none());

        let translucent = r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10">
            <rect width="10" height="10" fill="black" fill-opacity="0.5"/></svg>"#;
        assert!(from_svg(translucent).is_none());
        assert!(from_svg("not svg").is_none());
    }
}
