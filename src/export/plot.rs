//! # E-V 曲线绘图
//!
//! 使用 `plotters` 绘制每原子结合能对每原子体积的曲线。
//!
//! ## 功能
//! - 折线加数据点标记
//! - 标注能量最低点
//! - 扩展名为 `.svg` 时输出 SVG，否则 PNG
//!
//! ## 依赖关系
//! - 被 `commands/scan.rs` 调用
//! - 使用 `models/sample.rs` 的 EnergyVolumeCurve
//! - 使用 `plotters` 渲染图表

use crate::error::{EvError, Result};
use crate::models::EnergyVolumeCurve;

use plotters::prelude::*;
use std::ops::Range;
use std::path::Path;

/// 生成 E-V 图
pub fn generate_ev_plot(
    curve: &EnergyVolumeCurve,
    output_path: &Path,
    title: &str,
    width: u32,
    height: u32,
) -> Result<()> {
    if curve.is_empty() {
        return Err(EvError::InvalidArgument(
            "cannot plot a curve without successful points".to_string(),
        ));
    }

    let use_svg = output_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("svg"))
        .unwrap_or(false);

    if use_svg {
        let root = SVGBackend::new(output_path, (width, height)).into_drawing_area();
        draw_ev_chart(&root, curve, title)?;
        root.present()
            .map_err(|e| EvError::Other(e.to_string()))?;
    } else {
        let root = BitMapBackend::new(output_path, (width, height)).into_drawing_area();
        draw_ev_chart(&root, curve, title)?;
        root.present()
            .map_err(|e| EvError::Other(e.to_string()))?;
    }
    Ok(())
}

/// 数据范围两侧各留 5% 空白；范围为零时按量级展开
fn padded_range(values: &[f64]) -> Range<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    let pad = if span > 0.0 {
        0.05 * span
    } else {
        0.01 * min.abs().max(1.0)
    };
    (min - pad)..(max + pad)
}

fn draw_ev_chart<DB: DrawingBackend>(
    root: &DrawingArea<DB, plotters::coord::Shift>,
    curve: &EnergyVolumeCurve,
    title: &str,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)
        .map_err(|e| EvError::Other(format!("{:?}", e)))?;

    let x = curve.volume_per_atom();
    let y = curve.binding_energy_per_atom();

    let mut chart = ChartBuilder::on(root)
        .caption(title, ("sans-serif", 28).into_font())
        .margin(30)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(padded_range(&x), padded_range(&y))
        .map_err(|e| EvError::Other(format!("{:?}", e)))?;

    chart
        .configure_mesh()
        .x_desc("Volume per atom (Å³)")
        .y_desc("Energy per atom (eV)")
        .x_label_style(("sans-serif", 16))
        .y_label_style(("sans-serif", 16))
        .axis_desc_style(("sans-serif", 18))
        .draw()
        .map_err(|e| EvError::Other(format!("{:?}", e)))?;

    let line_color = RGBColor(0, 102, 204);
    let points: Vec<(f64, f64)> = x.iter().copied().zip(y.iter().copied()).collect();

    chart
        .draw_series(LineSeries::new(
            points.iter().copied(),
            line_color.stroke_width(2),
        ))
        .map_err(|e| EvError::Other(format!("{:?}", e)))?;

    chart
        .draw_series(
            points
                .iter()
                .map(|&(vx, vy)| Circle::new((vx, vy), 4, line_color.filled())),
        )
        .map_err(|e| EvError::Other(format!("{:?}", e)))?;

    if let Some(min) = curve.minimum() {
        let text = format!(
            "V = {:.3} Å³, E = {:.4} eV",
            min.volume_per_atom, min.binding_energy_per_atom
        );
        chart
            .draw_series(std::iter::once(Text::new(
                text,
                (min.volume_per_atom, min.binding_energy_per_atom),
                ("sans-serif", 14).into_font().color(&BLACK),
            )))
            .map_err(|e| EvError::Other(format!("{:?}", e)))?;
    }

    Ok(())
}
