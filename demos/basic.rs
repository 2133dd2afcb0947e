//! Basic example demonstrating hierkmeans-rs usage
//!
//! Run with: cargo run --example basic --release

use hierkmeans_rs::{HierarchicalKMeans, KMeansConfig};
use ndarray::Array2;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use std::collections::BTreeMap;
use std::fs;

fn main() {
    println!("=== hierkmeans-rs example ===\n");

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let input = dir.path().join("points.csv");
    let output = dir.path().join("clusters.csv");

    // Four groups, each made of two tighter sub-groups
    let n_samples = 800;
    let centers = [
        [-50.0, -50.0],
        [-40.0, -50.0],
        [50.0, 50.0],
        [60.0, 50.0],
        [-50.0, 50.0],
        [-40.0, 50.0],
        [50.0, -50.0],
        [60.0, -50.0],
    ];

    println!("Generating {} samples around {} centers...", n_samples, centers.len());
    let noise = Array2::random((n_samples, 2), Uniform::new(-1.0f64, 1.0));
    let mut text = String::from("label,x,y\n");
    for i in 0..n_samples {
        let c = centers[i % centers.len()];
        text.push_str(&format!(
            "p{},{:.4},{:.4}\n",
            i,
            c[0] + noise[[i, 0]],
            c[1] + noise[[i, 1]]
        ));
    }
    fs::write(&input, text).expect("Failed to write input");

    let config = KMeansConfig::new(4)
        .with_levels(2)
        .with_column_positions(vec![1, 2])
        .with_work_dir(dir.path().join("work"));

    println!("Running two-level k-means with k=4...\n");

    let mut kmeans = HierarchicalKMeans::with_config(config);
    let report = kmeans.fit(&input, &output).expect("Clustering failed");

    for level in &report.levels {
        println!(
            "  Level {}: {} rounds, {} centroids in {} buckets, converged={}",
            level.level, level.rounds, level.centroids, level.buckets, level.converged
        );
    }
    println!();

    println!("Leaf centroids:");
    for centroid in kmeans.centroids().unwrap().iter() {
        let coords = centroid.point().coords();
        println!(
            "  {:>6}: ({:.4}, {:.4})",
            centroid.path().to_string(),
            coords[0],
            coords[1]
        );
    }
    println!();

    // Count records per leaf path
    let clustered = fs::read_to_string(&output).expect("Failed to read output");
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for line in clustered.lines() {
        let fields: Vec<&str> = line.split(',').collect();
        let path = fields[fields.len() - 2..].join(":");
        *counts.entry(path).or_default() += 1;
    }

    println!("Cluster distribution:");
    for (path, count) in &counts {
        println!(
            "  {:>6}: {} samples ({:.1}%)",
            path,
            count,
            (*count as f64 / n_samples as f64) * 100.0
        );
    }
    println!();

    println!("First 5 output lines:");
    for line in clustered.lines().take(5) {
        println!("  {}", line);
    }

    println!("\n=== Done! ===");
}
