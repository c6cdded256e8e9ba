// 该文件是 Wanglou （望楼） 项目的一部分。
// src/input/image_dir.rs - 图像目录输入
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::fs;
use std::path::{Path, PathBuf};

use image::{
  ImageReader, RgbImage,
  imageops::{self, FilterType},
};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{BgrNchwFrame, EvalFrame, PIXEL_MEAN_BGR},
};

#[derive(Error, Debug)]
pub enum ImageDirInputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("目录 {0:?} 中没有可读的图像")]
  NoImages(PathBuf),
}

const IMAGE_DIR_SCHEME: &str = "images";
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// 按评测列表或字典序遍历目录下图像的输入源。
///
/// `images:///path/to/dir` 按文件名字典序扫描目录；
/// `images:///path/to/dir?list=val.txt` 按列表文件逐行给出的帧名取图。
pub struct ImageDirInput<const W: u32, const H: u32> {
  files: Vec<PathBuf>,
}

impl<const W: u32, const H: u32> FromUrl for ImageDirInput<W, H> {
  type Error = ImageDirInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != IMAGE_DIR_SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        IMAGE_DIR_SCHEME,
        url.scheme()
      );
      return Err(ImageDirInputError::SchemeMismatch);
    }

    let dir = PathBuf::from(url.path());
    let list = url
      .query_pairs()
      .find(|(key, _)| key == "list")
      .map(|(_, value)| value.into_owned());
    let files = match list {
      Some(list) => resolve_list(&dir, &list)?,
      None => scan_directory(&dir)?,
    };
    if files.is_empty() {
      return Err(ImageDirInputError::NoImages(dir));
    }
    info!("在 {:?} 下找到 {} 张图像", dir, files.len());

    Ok(ImageDirInput { files })
  }
}

impl<const W: u32, const H: u32> FromUrlWithScheme for ImageDirInput<W, H> {
  const SCHEME: &'static str = IMAGE_DIR_SCHEME;
}

impl<const W: u32, const H: u32> ImageDirInput<W, H> {
  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  pub fn into_frames(self) -> ImageDirFrames<W, H> {
    ImageDirFrames {
      files: self.files.into_iter(),
    }
  }
}

fn resolve_list(dir: &Path, list: &str) -> Result<Vec<PathBuf>, ImageDirInputError> {
  let list_path = if Path::new(list).is_absolute() {
    PathBuf::from(list)
  } else {
    dir.join(list)
  };
  let text = fs::read_to_string(&list_path)?;
  let mut files = Vec::new();
  for line in text.lines() {
    let name = line.trim();
    if name.is_empty() {
      continue;
    }
    files.push(resolve_name(dir, name));
  }
  Ok(files)
}

// 列表只给帧名，扩展名逐个探测；都不存在时仍按 png 解析,
// 打开失败会在迭代时按帧上报。
fn resolve_name(dir: &Path, name: &str) -> PathBuf {
  for ext in IMAGE_EXTENSIONS {
    let path = dir.join(name).with_extension(ext);
    if path.is_file() {
      return path;
    }
  }
  dir.join(name).with_extension(IMAGE_EXTENSIONS[0])
}

fn scan_directory(dir: &Path) -> Result<Vec<PathBuf>, ImageDirInputError> {
  let mut files = Vec::new();
  for entry in fs::read_dir(dir)? {
    let path = entry?.path();
    let matched = path
      .extension()
      .and_then(|ext| ext.to_str())
      .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
      .unwrap_or(false);
    if matched && path.is_file() {
      files.push(path);
    }
  }
  files.sort();
  Ok(files)
}

pub struct ImageDirFrames<const W: u32, const H: u32> {
  files: std::vec::IntoIter<PathBuf>,
}

impl<const W: u32, const H: u32> Iterator for ImageDirFrames<W, H> {
  type Item = Result<EvalFrame<W, H>, ImageDirInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.files.next()?;
    Some(load_frame::<W, H>(&path))
  }
}

fn load_frame<const W: u32, const H: u32>(
  path: &Path,
) -> Result<EvalFrame<W, H>, ImageDirInputError> {
  let image = ImageReader::open(path)?.decode()?.to_rgb8();
  let (image_w, image_h) = image.dimensions();
  let name = path
    .file_stem()
    .map(|stem| stem.to_string_lossy().into_owned())
    .unwrap_or_default();
  let resized = imageops::resize(&image, W, H, FilterType::Triangle);
  let tensor = BgrNchwFrame::from(&resized);

  Ok(EvalFrame::new(name, image_w, image_h, image.into_raw(), tensor))
}

impl<const W: u32, const H: u32> From<&RgbImage> for BgrNchwFrame<W, H> {
  fn from(image: &RgbImage) -> Self {
    let (width, height) = image.dimensions();
    if (width, height) != (W, H) {
      panic!("图像尺寸不匹配: 期望 {}x{}, 实际 {}x{}", W, H, width, height);
    }

    let mut frame = BgrNchwFrame::default();
    let plane = (W as usize) * (H as usize);
    let slice = frame.as_mut();

    for h in 0..H {
      for w in 0..W {
        let pixel = image.get_pixel(w, h);
        let index = (h as usize) * (W as usize) + (w as usize);
        // 通道按 B、G、R 排列，逐通道减去训练集像素均值
        slice[index] = pixel[2] as f32 - PIXEL_MEAN_BGR[0];
        slice[plane + index] = pixel[1] as f32 - PIXEL_MEAN_BGR[1];
        slice[2 * plane + index] = pixel[0] as f32 - PIXEL_MEAN_BGR[2];
      }
    }
    frame
  }
}

#[cfg(test)]
mod tests {
  use crate::input::{AsNetInput, AsPlanarFrame, InputWrapper};

  use super::*;

  #[test]
  fn directory_scan_is_sorted_and_skips_other_files() {
    let dir = std::env::temp_dir().join("wanglou-image-dir-scan-test");
    fs::create_dir_all(&dir).unwrap();
    RgbImage::new(4, 2).save(dir.join("b.png")).unwrap();
    RgbImage::new(2, 2).save(dir.join("a.png")).unwrap();
    fs::write(dir.join("notes.txt"), "ignored").unwrap();

    let url = Url::parse(&format!("images://{}", dir.display())).unwrap();
    let input = InputWrapper::<2, 1>::from_url(&url).unwrap();
    assert_eq!(input.len(), 2);
    assert!(!input.is_empty());

    let frames: Vec<_> = input
      .into_frames()
      .collect::<Result<_, _>>()
      .unwrap();
    assert_eq!(frames[0].frame_name(), "a");
    assert_eq!(frames[0].image_size(), (2, 2));
    assert_eq!(frames[1].frame_name(), "b");
    assert_eq!(frames[1].image_size(), (4, 2));
    fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn eval_list_gives_membership_and_order() {
    let dir = std::env::temp_dir().join("wanglou-image-dir-list-test");
    fs::create_dir_all(&dir).unwrap();
    for name in ["000001.png", "000002.png", "000003.png"] {
      RgbImage::new(2, 1).save(dir.join(name)).unwrap();
    }
    fs::write(dir.join("val.txt"), "000003\n\n000001\n").unwrap();

    let url = Url::parse(&format!("images://{}?list=val.txt", dir.display())).unwrap();
    let input = ImageDirInput::<2, 1>::from_url(&url).unwrap();
    assert_eq!(input.len(), 2);

    let names: Vec<String> = input
      .into_frames()
      .map(|frame| frame.unwrap().frame_name().to_string())
      .collect();
    assert_eq!(names, vec!["000003", "000001"]);
    fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn bgr_planes_subtract_pixel_mean() {
    let image = RgbImage::from_raw(2, 1, vec![255, 128, 0, 0, 64, 255]).unwrap();
    let frame = BgrNchwFrame::<2, 1>::from(&image);
    let planar = frame.as_planar();

    assert_eq!(planar[0], 0.0 - PIXEL_MEAN_BGR[0]);
    assert_eq!(planar[1], 255.0 - PIXEL_MEAN_BGR[0]);
    assert_eq!(planar[2], 128.0 - PIXEL_MEAN_BGR[1]);
    assert_eq!(planar[3], 64.0 - PIXEL_MEAN_BGR[1]);
    assert_eq!(planar[4], 255.0 - PIXEL_MEAN_BGR[2]);
    assert_eq!(planar[5], 0.0 - PIXEL_MEAN_BGR[2]);
  }

  #[test]
  fn scheme_is_checked() {
    let url = Url::parse("file:///tmp/images").unwrap();
    assert!(matches!(
      ImageDirInput::<1248, 384>::from_url(&url),
      Err(ImageDirInputError::SchemeMismatch)
    ));
  }
}
