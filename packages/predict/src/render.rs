//! Chart descriptions and the renderers that consume them.
//!
//! The pipeline never draws anything itself. It describes each chart as a
//! [`Chart`] value and hands it to a [`ChartRenderer`].

use std::cell::RefCell;
use std::io::Write;

use serde::Serialize;

/// Values of one category in a box or violin plot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryGroup {
    pub name: String,
    pub values: Vec<f64>,
}

/// A chart to be drawn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Chart {
    Scatter {
        title: String,
        x_label: String,
        y_label: String,
        points: Vec<(f64, f64)>,
    },
    /// Square matrix; `labels` names both rows and columns.
    Heatmap {
        title: String,
        labels: Vec<String>,
        values: Vec<Vec<f64>>,
    },
    Box {
        title: String,
        category_label: String,
        value_label: String,
        groups: Vec<CategoryGroup>,
    },
    Violin {
        title: String,
        category_label: String,
        value_label: String,
        groups: Vec<CategoryGroup>,
    },
}

impl Chart {
    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            Self::Scatter { title, .. }
            | Self::Heatmap { title, .. }
            | Self::Box { title, .. }
            | Self::Violin { title, .. } => title,
        }
    }

    /// Number of plotted values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Scatter { points, .. } => points.len(),
            Self::Heatmap { values, .. } => values.iter().map(Vec::len).sum(),
            Self::Box { groups, .. } | Self::Violin { groups, .. } => {
                groups.iter().map(|g| g.values.len()).sum()
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Something that can draw charts. Rendering never fails the caller.
pub trait ChartRenderer {
    fn render(&self, chart: &Chart);
}

/// Logs a one-line summary of each chart.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogChartRenderer;

impl ChartRenderer for LogChartRenderer {
    fn render(&self, chart: &Chart) {
        log::info!("Chart '{}' ({} values)", chart.title(), chart.len());
    }
}

/// Discards every chart.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopChartRenderer;

impl ChartRenderer for NoopChartRenderer {
    fn render(&self, _chart: &Chart) {}
}

/// Writes each chart as one line of JSON for an external plotting tool.
pub struct JsonChartRenderer {
    writer: RefCell<Box<dyn Write>>,
}

impl JsonChartRenderer {
    pub fn new(writer: impl Write + 'static) -> Self {
        Self {
            writer: RefCell::new(Box::new(writer)),
        }
    }
}

impl ChartRenderer for JsonChartRenderer {
    fn render(&self, chart: &Chart) {
        let mut writer = self.writer.borrow_mut();
        let result = serde_json::to_writer(&mut *writer, chart)
            .map_err(std::io::Error::from)
            .and_then(|()| writeln!(writer))
            .and_then(|()| writer.flush());
        if let Err(e) = result {
            log::warn!("Failed to write chart '{}': {e}", chart.title());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    /// A writer whose buffer outlives the renderer.
    #[derive(Clone, Default)]
    struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn scatter() -> Chart {
        Chart::Scatter {
            title: "Actual vs predicted".to_string(),
            x_label: "actual".to_string(),
            y_label: "predicted".to_string(),
            points: vec![(1.0, 2.0), (3.0, 4.0)],
        }
    }

    #[test]
    fn json_renderer_writes_one_line_per_chart() {
        let buffer = SharedBuffer::default();
        let renderer = JsonChartRenderer::new(buffer.clone());
        renderer.render(&scatter());
        renderer.render(&Chart::Heatmap {
            title: "Correlation".to_string(),
            labels: vec!["price".to_string()],
            values: vec![vec![1.0]],
        });

        let text = String::from_utf8(buffer.0.borrow().clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["type"], "scatter");
        assert_eq!(first["points"][1][0], 3.0);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["type"], "heatmap");
    }

    #[test]
    fn chart_len_counts_values() {
        assert_eq!(scatter().len(), 2);
        let chart = Chart::Box {
            title: "Price by tenure".to_string(),
            category_label: "tenure_type".to_string(),
            value_label: "price".to_string(),
            groups: vec![
                CategoryGroup {
                    name: "F".to_string(),
                    values: vec![1.0, 2.0],
                },
                CategoryGroup {
                    name: "L".to_string(),
                    values: vec![3.0],
                },
            ],
        };
        assert_eq!(chart.len(), 3);
        assert!(!chart.is_empty());
    }
}
