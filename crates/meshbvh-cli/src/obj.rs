//! Minimal Wavefront OBJ reader: vertex positions and faces only.

use anyhow::{bail, Context, Result};

/// Indexed triangle mesh with flat position and index buffers.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ObjMesh {
    /// `x, y, z` per vertex.
    pub positions: Vec<f32>,
    /// Three vertex indices per triangle.
    pub indices: Vec<u32>,
}

impl ObjMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Parse OBJ text. Polygons are fan-triangulated; other statements are ignored.
pub fn parse_obj(text: &str) -> Result<ObjMesh> {
    let mut mesh = ObjMesh::default();
    let mut face = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let line_no = line_no + 1;
        let line = line.split('#').next().unwrap_or("").trim();
        let mut tokens = line.split_whitespace();

        match tokens.next() {
            Some("v") => {
                for _ in 0..3 {
                    let value = tokens.next().with_context(|| {
                        format!("line {line_no}: vertex needs three coordinates")
                    })?;
                    let value: f32 = value
                        .parse()
                        .with_context(|| format!("line {line_no}: bad coordinate {value:?}"))?;
                    mesh.positions.push(value);
                }
            }
            Some("f") => {
                face.clear();
                for token in tokens {
                    face.push(resolve_index(token, mesh.vertex_count(), line_no)?);
                }
                if face.len() < 3 {
                    bail!("line {line_no}: face needs at least three vertices");
                }
                for i in 1..face.len() - 1 {
                    mesh.indices.extend_from_slice(&[face[0], face[i], face[i + 1]]);
                }
            }
            _ => {}
        }
    }

    Ok(mesh)
}

/// Resolve one face vertex (`a`, `a/b`, `a//c`, `a/b/c`) to a zero-based index.
fn resolve_index(token: &str, vertex_count: usize, line_no: usize) -> Result<u32> {
    let raw = token.split('/').next().unwrap_or("");
    let index: i64 = raw
        .parse()
        .with_context(|| format!("line {line_no}: bad face index {token:?}"))?;

    // Negative indices count back from the most recent vertex.
    let resolved = match index {
        0 => bail!("line {line_no}: face index 0 is invalid"),
        i if i > 0 => i - 1,
        i => vertex_count as i64 + i,
    };
    if resolved < 0 || resolved >= vertex_count as i64 {
        bail!("line {line_no}: face index {index} out of range ({vertex_count} vertices so far)");
    }
    u32::try_from(resolved).with_context(|| format!("line {line_no}: face index {index} too large"))
}
