use std::f64::consts::PI;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use image::{Rgb, RgbImage};
use rstest::*;
use tempfile::TempDir;
use uuid::Uuid;
use visearch::detect::Detection;
use visearch::extract::extract_bundle;
use visearch::region::Region;
use visearch::shape3d::extract_mesh_features;
use visearch::similarity::{SearchParams, find_similar};
use visearch::similarity3d::search_similar;
use visearch::store::{GalleryStore, JsonFileBackend, ModelEntry, ModelStore};

#[fixture]
fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

#[fixture]
fn gallery(temp_dir: TempDir) -> (GalleryStore, TempDir) {
    let store =
        GalleryStore::open(Box::new(JsonFileBackend::new(temp_dir.path().join("gallery.json"))))
            .unwrap();
    (store, temp_dir)
}

fn detection(class: &str) -> Detection {
    Detection {
        bbox: [4.0, 4.0, 60.0, 60.0],
        class_name: class.into(),
        confidence: 0.9,
        class_id: 15,
        uid: Some(Uuid::new_v4()),
    }
}

/// 纹理随相位变化的合成「猫」图
fn cat_image(phase: u32) -> RgbImage {
    RgbImage::from_fn(64, 64, |x, y| {
        if ((x + phase) / 8 + y / 8) % 2 == 0 { Rgb([210, 140, 60]) } else { Rgb([60, 40, 20]) }
    })
}

#[rstest]
fn two_cats_across_images(gallery: (GalleryStore, TempDir)) {
    let (mut store, _guard) = gallery;

    for (image_id, phase) in [("cat1.jpg", 0u32), ("cat2.jpg", 2)] {
        let region = Region::from_image(cat_image(phase));
        let bundle = extract_bundle(&region, None).unwrap();
        store.save_detections(image_id, vec![detection("cat")]).unwrap();
        store.save_features(image_id, 0, bundle).unwrap();
    }

    let query = store.get_features("cat1.jpg", 0).unwrap().bundle.clone();
    let params = SearchParams {
        exclude_image_id: Some("cat1.jpg".to_string()),
        ..SearchParams::default()
    };
    let results = find_similar(&store, &query, "cat", &params);

    // 查询图片自身被排除，只命中另一张图里的猫
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].image_id, "cat2.jpg");
    assert_eq!(results[0].class, "cat");
    assert!(results[0].similarity > 0.5);
}

#[rstest]
fn class_gate_blocks_cross_class(gallery: (GalleryStore, TempDir)) {
    let (mut store, _guard) = gallery;

    let bundle = extract_bundle(&Region::from_image(cat_image(0)), None).unwrap();
    store.save_detections("cat.jpg", vec![detection("cat")]).unwrap();
    store.save_features("cat.jpg", 0, bundle.clone()).unwrap();
    store.save_detections("dog.jpg", vec![detection("dog")]).unwrap();
    store.save_features("dog.jpg", 0, bundle.clone()).unwrap();

    let results = find_similar(&store, &bundle, "cat", &SearchParams::default());
    assert!(results.iter().all(|r| r.class.eq_ignore_ascii_case("cat")));
    assert!(!results.iter().any(|r| r.image_id == "dog.jpg"));
}

#[rstest]
fn store_survives_reopen(gallery: (GalleryStore, TempDir)) {
    let (mut store, guard) = gallery;

    let bundle = extract_bundle(&Region::from_image(cat_image(0)), None).unwrap();
    store.save_detections("cat.jpg", vec![detection("cat")]).unwrap();
    store.save_features("cat.jpg", 0, bundle.clone()).unwrap();
    drop(store);

    let reopened =
        GalleryStore::open(Box::new(JsonFileBackend::new(guard.path().join("gallery.json"))))
            .unwrap();
    assert_eq!(reopened.get_features("cat.jpg", 0).unwrap().bundle, bundle);
}

/// 写出单位立方体 OBJ
fn write_cube(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("cube.obj");
    fs::write(
        &path,
        "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nv 0 0 1\nv 1 0 1\nv 1 1 1\nv 0 1 1\n\
         f 1 4 3 2\nf 5 6 7 8\nf 1 2 6 5\nf 2 3 7 6\nf 3 4 8 7\nf 4 1 5 8\n",
    )
    .unwrap();
    path
}

/// 写出经纬细分的球面 OBJ
fn write_sphere(dir: &TempDir, name: &str, stacks: usize, slices: usize) -> PathBuf {
    let mut obj = String::new();
    writeln!(obj, "v 0 0 1").unwrap();
    for i in 1..stacks {
        let phi = PI * i as f64 / stacks as f64;
        for j in 0..slices {
            let theta = 2.0 * PI * j as f64 / slices as f64;
            writeln!(
                obj,
                "v {} {} {}",
                phi.sin() * theta.cos(),
                phi.sin() * theta.sin(),
                phi.cos()
            )
            .unwrap();
        }
    }
    writeln!(obj, "v 0 0 -1").unwrap();

    let bottom = 2 + (stacks - 1) * slices;
    let ring = |i: usize, j: usize| 2 + (i - 1) * slices + j % slices;
    for j in 0..slices {
        writeln!(obj, "f 1 {} {}", ring(1, j), ring(1, j + 1)).unwrap();
        writeln!(obj, "f {} {} {}", bottom, ring(stacks - 1, j + 1), ring(stacks - 1, j)).unwrap();
    }
    for i in 1..stacks - 1 {
        for j in 0..slices {
            writeln!(obj, "f {} {} {}", ring(i, j), ring(i + 1, j), ring(i + 1, j + 1)).unwrap();
            writeln!(obj, "f {} {} {}", ring(i, j), ring(i + 1, j + 1), ring(i, j + 1)).unwrap();
        }
    }

    let path = dir.path().join(name);
    fs::write(&path, obj).unwrap();
    path
}

#[rstest]
fn sphere_query_ranks_sphere_above_cube(temp_dir: TempDir) {
    let mut store =
        ModelStore::open(Box::new(JsonFileBackend::new(temp_dir.path().join("models3d.json"))))
            .unwrap();

    for (id, path) in [
        ("cube", write_cube(&temp_dir)),
        ("sphere", write_sphere(&temp_dir, "sphere.obj", 24, 48)),
    ] {
        let features = extract_mesh_features(&path).unwrap();
        store
            .save_model(
                id,
                ModelEntry {
                    features,
                    obj_path: path.to_string_lossy().to_string(),
                    metadata: Default::default(),
                },
            )
            .unwrap();
    }

    // 查询用的球与库中的球细分程度不同，但几何上仍然更接近球而非立方体
    let query_path = write_sphere(&temp_dir, "query.obj", 16, 32);
    let query = extract_mesh_features(&query_path).unwrap();
    let results = search_similar(&store, &query.global, 10, None);

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].model_id, "sphere");
    assert!(results[0].distance < results[1].distance);
}

#[rstest]
fn mesh_features_scale_invariant(temp_dir: TempDir) {
    let path = write_cube(&temp_dir);
    let original = extract_mesh_features(&path).unwrap();

    // 放大 10 倍后重写
    let scaled_path = temp_dir.path().join("cube10.obj");
    let content = fs::read_to_string(&path).unwrap();
    let scaled: String = content
        .lines()
        .map(|line| {
            if let Some(rest) = line.strip_prefix("v ") {
                let coords: Vec<f64> =
                    rest.split_whitespace().map(|t| t.parse::<f64>().unwrap() * 10.0).collect();
                format!("v {} {} {}\n", coords[0], coords[1], coords[2])
            } else {
                format!("{}\n", line)
            }
        })
        .collect();
    fs::write(&scaled_path, scaled).unwrap();

    let scaled = extract_mesh_features(&scaled_path).unwrap();
    for (a, b) in original.global.to_array().iter().zip(scaled.global.to_array()) {
        assert!((a - b).abs() < 1e-9, "{} vs {}", a, b);
    }
    // 原始包围盒不受归一化影响，反映放大后的真实尺寸
    assert!((scaled.mesh_info.bounding_box.width - 10.0).abs() < 1e-9);
}
