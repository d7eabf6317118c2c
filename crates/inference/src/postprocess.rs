//! Un-windowing, stream fusion, per-video NMS and CSV export of detections.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use data_contracts::{segment_iou, PostprocessConfig, Proposal, WindowMeta, BACKGROUND_CLASS};
use thiserror::Error;

use crate::decode::DetectionOutput;

#[derive(Debug, Error)]
pub enum PostprocessError {
    #[error("batch has {windows} windows but {batch} prediction rows")]
    WindowCount { windows: usize, batch: usize },
    #[error("cannot fuse {0}")]
    Fusion(String),
    #[error("csv error at {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed row {row} in {path}: {msg}")]
    Malformed {
        path: PathBuf,
        row: usize,
        msg: String,
    },
}

/// One anchor's prediction in absolute frames of its video.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorRow {
    pub video_name: String,
    pub xmin: f32,
    pub xmax: f32,
    pub conf: f32,
    /// Class probabilities, background first.
    pub scores: Vec<f32>,
}

/// Clip anchors to their window and shift them to absolute frames.
pub fn result_process(
    output: &DetectionOutput,
    windows: &[WindowMeta],
    window_size: f32,
) -> Result<Vec<AnchorRow>, PostprocessError> {
    if windows.len() != output.batch {
        return Err(PostprocessError::WindowCount {
            windows: windows.len(),
            batch: output.batch,
        });
    }
    let mut rows = Vec::with_capacity(output.batch * output.anchors);
    for (b, window) in windows.iter().enumerate() {
        for a in 0..output.anchors {
            let i = b * output.anchors + a;
            rows.push(AnchorRow {
                video_name: window.video.clone(),
                xmin: output.xmin[i].max(0.0) + window.start,
                xmax: output.xmax[i].min(window_size) + window.start,
                conf: output.conf[i],
                scores: output.probs_of(i).to_vec(),
            });
        }
    }
    Ok(rows)
}

/// Average row-aligned prediction tables from several streams.
pub fn fuse_streams(tables: &[Vec<AnchorRow>]) -> Result<Vec<AnchorRow>, PostprocessError> {
    let Some(first) = tables.first() else {
        return Err(PostprocessError::Fusion("an empty set of streams".into()));
    };
    for (s, table) in tables.iter().enumerate().skip(1) {
        if table.len() != first.len() {
            return Err(PostprocessError::Fusion(format!(
                "stream {s} with {} rows against {} rows",
                table.len(),
                first.len()
            )));
        }
    }
    let n = tables.len() as f32;
    let mut fused = Vec::with_capacity(first.len());
    for (r, base) in first.iter().enumerate() {
        let mut row = AnchorRow {
            video_name: base.video_name.clone(),
            xmin: 0.0,
            xmax: 0.0,
            conf: 0.0,
            scores: vec![0.0; base.scores.len()],
        };
        for table in tables {
            let other = &table[r];
            if other.video_name != base.video_name || other.scores.len() != base.scores.len() {
                return Err(PostprocessError::Fusion(format!(
                    "row {r}: {} ({} classes) against {} ({} classes)",
                    other.video_name,
                    other.scores.len(),
                    base.video_name,
                    base.scores.len()
                )));
            }
            row.xmin += other.xmin / n;
            row.xmax += other.xmax / n;
            row.conf += other.conf / n;
            for (acc, s) in row.scores.iter_mut().zip(&other.scores) {
                *acc += s / n;
            }
        }
        fused.push(row);
    }
    Ok(fused)
}

/// Greedy 1-D non-maximum suppression; output sorted by descending score.
pub fn temporal_nms(mut candidates: Vec<Proposal>, threshold: f32) -> Vec<Proposal> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<Proposal> = Vec::new();
    for cand in candidates {
        let suppressed = kept
            .iter()
            .any(|k| segment_iou([k.start, k.end], [cand.start, cand.end]) > threshold);
        if !suppressed {
            kept.push(cand);
        }
    }
    kept
}

/// Score, threshold and suppress anchor rows into ranked per-video proposals.
pub fn final_result_process(rows: &[AnchorRow], cfg: &PostprocessConfig) -> Vec<Proposal> {
    let mut per_video: BTreeMap<&str, Vec<&AnchorRow>> = BTreeMap::new();
    for row in rows {
        per_video.entry(row.video_name.as_str()).or_default().push(row);
    }

    let mut proposals = Vec::new();
    for (video, rows) in per_video {
        let num_classes = rows.iter().map(|r| r.scores.len()).max().unwrap_or(0);
        let mut video_props = Vec::new();
        for class in (0..num_classes).filter(|c| *c != BACKGROUND_CLASS) {
            let candidates: Vec<Proposal> = rows
                .iter()
                .filter(|r| r.xmax > r.xmin)
                .filter_map(|r| {
                    let score = r.scores.get(class)? * r.conf;
                    (score >= cfg.min_score).then(|| Proposal {
                        video_name: video.to_string(),
                        class,
                        score,
                        start: r.xmin,
                        end: r.xmax,
                    })
                })
                .collect();
            video_props.extend(temporal_nms(candidates, cfg.nms_threshold));
        }
        video_props.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.class.cmp(&b.class))
                .then(a.start.total_cmp(&b.start))
        });
        video_props.truncate(cfg.max_proposals);
        proposals.extend(video_props);
    }
    tracing::debug!(proposals = proposals.len(), "final proposals");
    proposals
}

fn ensure_parent(path: &Path) -> Result<(), PostprocessError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| PostprocessError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Write anchor rows as `video_name,xmin,xmax,conf,score_0..score_{C-1}`.
pub fn write_anchor_rows(path: &Path, rows: &[AnchorRow]) -> Result<(), PostprocessError> {
    ensure_parent(path)?;
    let csv_err = |e| PostprocessError::Csv {
        path: path.to_path_buf(),
        source: e,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    let classes = rows.first().map_or(0, |r| r.scores.len());
    let mut header: Vec<String> = ["video_name", "xmin", "xmax", "conf"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    header.extend((0..classes).map(|c| format!("score_{c}")));
    writer.write_record(&header).map_err(csv_err)?;
    for row in rows {
        let mut record = vec![
            row.video_name.clone(),
            row.xmin.to_string(),
            row.xmax.to_string(),
            row.conf.to_string(),
        ];
        record.extend(row.scores.iter().map(|s| s.to_string()));
        writer.write_record(&record).map_err(csv_err)?;
    }
    writer.flush().map_err(|e| PostprocessError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

pub fn read_anchor_rows(path: &Path) -> Result<Vec<AnchorRow>, PostprocessError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| PostprocessError::Csv {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut rows = Vec::new();
    for (r, record) in reader.records().enumerate() {
        let record = record.map_err(|e| PostprocessError::Csv {
            path: path.to_path_buf(),
            source: e,
        })?;
        let malformed = |msg: String| PostprocessError::Malformed {
            path: path.to_path_buf(),
            row: r,
            msg,
        };
        if record.len() < 5 {
            return Err(malformed(format!("expected at least 5 fields, found {}", record.len())));
        }
        let mut nums = Vec::with_capacity(record.len() - 1);
        for field in record.iter().skip(1) {
            nums.push(
                field
                    .parse::<f32>()
                    .map_err(|e| malformed(format!("{field:?}: {e}")))?,
            );
        }
        rows.push(AnchorRow {
            video_name: record[0].to_string(),
            xmin: nums[0],
            xmax: nums[1],
            conf: nums[2],
            scores: nums[3..].to_vec(),
        });
    }
    Ok(rows)
}

/// Write proposals as `video_name,class,score,start,end`.
pub fn write_proposals(path: &Path, proposals: &[Proposal]) -> Result<(), PostprocessError> {
    ensure_parent(path)?;
    let csv_err = |e| PostprocessError::Csv {
        path: path.to_path_buf(),
        source: e,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    for p in proposals {
        writer.serialize(p).map_err(csv_err)?;
    }
    writer.flush().map_err(|e| PostprocessError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

pub fn read_proposals(path: &Path) -> Result<Vec<Proposal>, PostprocessError> {
    let csv_err = |e| PostprocessError::Csv {
        path: path.to_path_buf(),
        source: e,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    reader
        .deserialize()
        .collect::<Result<Vec<Proposal>, _>>()
        .map_err(csv_err)
}
