//! Colored point mesh and PLY export.

use std::io::{self, BufWriter, Write};
use std::path::Path;

/// One reconstructed surface point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    /// Position in the camera frame, metric units of the calibration.
    pub position: [f64; 3],
    /// RGB color sampled from the reference image.
    pub color: [u8; 3],
}

/// Unordered collection of colored vertices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    vertices: Vec<Vertex>,
}

impl Mesh {
    /// Create an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a vertex.
    pub fn push(&mut self, vertex: Vertex) {
        self.vertices.push(vertex);
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Returns `true` when the mesh has no vertices.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// All vertices in insertion order.
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Write the mesh as ASCII PLY.
    pub fn write_ply<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "ply")?;
        writeln!(writer, "format ascii 1.0")?;
        writeln!(writer, "element vertex {}", self.vertices.len())?;
        writeln!(writer, "property float x")?;
        writeln!(writer, "property float y")?;
        writeln!(writer, "property float z")?;
        writeln!(writer, "property uchar red")?;
        writeln!(writer, "property uchar green")?;
        writeln!(writer, "property uchar blue")?;
        writeln!(writer, "end_header")?;
        for v in &self.vertices {
            writeln!(
                writer,
                "{} {} {} {} {} {}",
                v.position[0], v.position[1], v.position[2], v.color[0], v.color[1], v.color[2]
            )?;
        }
        Ok(())
    }

    /// Write the mesh as ASCII PLY to a file.
    pub fn save_ply(&self, path: &Path) -> io::Result<()> {
        let file = std::fs::File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write_ply(&mut writer)?;
        writer.flush()
    }
}
