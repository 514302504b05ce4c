//! Turns the loosely-typed media fields of a [`Post`] into display-ready descriptors.
//!
//! Resolution order for the image shown on a card is fixed: the first preview image,
//! else the first gallery item if the side table resolves it, else nothing. Gallery mode is a separate
//! question and only applies when more than one gallery image resolves. Video is
//! additive: it rides alongside whatever image is shown and always wins the tap.

use std::collections::HashMap;

use crate::format::decode_html_entities;
use crate::reddit::{MediaMetadata, Post, PostMedia as RawMedia, RedditVideo};

#[derive(Debug, Clone, PartialEq)]
pub struct ImageSource {
    pub url: String,
    pub width: i64,
    pub height: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoSource {
    pub url: String,
    pub width: i64,
    pub height: i64,
    pub duration: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayImage {
    Preview(ImageSource),
    Gallery(ImageSource),
    None,
}

impl DisplayImage {
    pub fn resolve(post: &Post) -> Self {
        if let Some(image) = preview_image(post) {
            return DisplayImage::Preview(image);
        }
        if let Some(image) = first_gallery_image(post) {
            return DisplayImage::Gallery(image);
        }
        DisplayImage::None
    }

    pub fn image(&self) -> Option<&ImageSource> {
        match self {
            DisplayImage::Preview(image) | DisplayImage::Gallery(image) => Some(image),
            DisplayImage::None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TapTarget {
    Video(VideoSource),
    Images { images: Vec<ImageSource>, start: usize },
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostMedia {
    pub image: DisplayImage,
    /// Empty unless the post is a gallery with at least two resolvable images.
    pub gallery: Vec<ImageSource>,
    pub video: Option<VideoSource>,
}

impl PostMedia {
    pub fn from_post(post: &Post) -> Self {
        let gallery = gallery_images(post);
        Self {
            image: DisplayImage::resolve(post),
            gallery: if gallery.len() > 1 { gallery } else { Vec::new() },
            video: video_source(post),
        }
    }

    pub fn is_gallery(&self) -> bool {
        self.gallery.len() > 1
    }

    pub fn has_media_area(&self) -> bool {
        self.image.image().is_some() || self.video.is_some()
    }

    pub fn tap_target(&self, start: usize) -> TapTarget {
        if let Some(video) = &self.video {
            return TapTarget::Video(video.clone());
        }
        if self.is_gallery() {
            let start = start.min(self.gallery.len() - 1);
            return TapTarget::Images {
                images: self.gallery.clone(),
                start,
            };
        }
        match self.image.image() {
            Some(image) => TapTarget::Images {
                images: vec![image.clone()],
                start: 0,
            },
            None => TapTarget::None,
        }
    }
}

fn preview_image(post: &Post) -> Option<ImageSource> {
    let source = post.preview.as_ref()?.images.first()?.source.as_ref()?;
    if source.url.trim().is_empty() {
        return None;
    }
    Some(ImageSource {
        url: decode_html_entities(&source.url),
        width: source.width,
        height: source.height,
    })
}

pub fn gallery_images(post: &Post) -> Vec<ImageSource> {
    let (Some(gallery), Some(metadata)) = (&post.gallery_data, &post.media_metadata) else {
        return Vec::new();
    };
    gallery
        .items
        .iter()
        .filter_map(|item| resolve_gallery_item(metadata, &item.media_id))
        .collect()
}

/// The card thumbnail only ever comes from the first gallery item.
fn first_gallery_image(post: &Post) -> Option<ImageSource> {
    let first = post.gallery_data.as_ref()?.items.first()?;
    resolve_gallery_item(post.media_metadata.as_ref()?, &first.media_id)
}

fn resolve_gallery_item(
    metadata: &HashMap<String, MediaMetadata>,
    media_id: &str,
) -> Option<ImageSource> {
    let source = metadata.get(media_id)?.source.as_ref()?;
    let url = source
        .url
        .as_deref()
        .or(source.gif.as_deref())
        .filter(|url| !url.trim().is_empty())?;
    Some(ImageSource {
        url: decode_html_entities(url),
        width: source.width,
        height: source.height,
    })
}

pub fn video_source(post: &Post) -> Option<VideoSource> {
    if !post.is_video {
        return None;
    }
    from_media(post.secure_media.as_ref(), &post.title)
        .or_else(|| from_media(post.media.as_ref(), &post.title))
}

fn from_media(media: Option<&RawMedia>, title: &str) -> Option<VideoSource> {
    let video = media?.reddit_video.as_ref()?;
    from_reddit_video(video, title)
}

fn from_reddit_video(video: &RedditVideo, title: &str) -> Option<VideoSource> {
    if video.transcoding_status.eq_ignore_ascii_case("error") {
        return None;
    }
    let url = [&video.fallback_url, &video.hls_url, &video.dash_url]
        .into_iter()
        .map(|url| url.trim())
        .find(|url| !url.is_empty())?;
    let label = if title.trim().is_empty() {
        "Reddit video".to_string()
    } else {
        title.trim().to_string()
    };
    Some(VideoSource {
        url: decode_html_entities(url),
        width: video.width,
        height: video.height,
        duration: video.duration,
        label,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reddit::{
        GalleryData, GalleryItem, MediaMetadataImage, Preview, PreviewImage, PreviewSource,
    };

    fn preview(url: &str) -> Option<Preview> {
        Some(Preview {
            images: vec![PreviewImage {
                source: Some(PreviewSource {
                    url: url.into(),
                    width: 640,
                    height: 480,
                }),
                ..PreviewImage::default()
            }],
            enabled: true,
        })
    }

    fn gallery(post: &mut Post, ids: &[&str], resolvable: &[&str]) {
        post.gallery_data = Some(GalleryData {
            items: ids
                .iter()
                .enumerate()
                .map(|(i, id)| GalleryItem {
                    id: i as i64,
                    media_id: id.to_string(),
                })
                .collect(),
        });
        let mut metadata = HashMap::new();
        for id in resolvable {
            metadata.insert(
                id.to_string(),
                MediaMetadata {
                    status: "valid".into(),
                    source: Some(MediaMetadataImage {
                        url: Some(format!("https://i.redd.it/{id}.jpg?a=1&amp;b=2")),
                        width: 100,
                        height: 200,
                        ..MediaMetadataImage::default()
                    }),
                    ..MediaMetadata::default()
                },
            );
        }
        post.media_metadata = Some(metadata);
    }

    fn video_post() -> Post {
        Post {
            id: "v".into(),
            title: " Clip ".into(),
            is_video: true,
            media: Some(RawMedia {
                reddit_video: Some(RedditVideo {
                    fallback_url: "https://v.redd.it/x/DASH_720.mp4?source=fallback".into(),
                    hls_url: "https://v.redd.it/x/HLSPlaylist.m3u8".into(),
                    width: 1280,
                    height: 720,
                    duration: 31.0,
                    ..RedditVideo::default()
                }),
            }),
            preview: preview("https://preview.redd.it/thumb.jpg"),
            ..Post::default()
        }
    }

    #[test]
    fn preview_wins_over_gallery() {
        let mut post = Post {
            preview: preview("https://preview.redd.it/a.jpg?w=1&amp;s=2"),
            ..Post::default()
        };
        gallery(&mut post, &["m1", "m2"], &["m1", "m2"]);
        match DisplayImage::resolve(&post) {
            DisplayImage::Preview(image) => {
                assert_eq!(image.url, "https://preview.redd.it/a.jpg?w=1&s=2")
            }
            other => panic!("expected preview, got {other:?}"),
        }
    }

    #[test]
    fn gallery_first_image_when_no_preview() {
        let mut post = Post::default();
        gallery(&mut post, &["m1", "m2"], &["m1", "m2"]);
        match DisplayImage::resolve(&post) {
            DisplayImage::Gallery(image) => {
                assert_eq!(image.url, "https://i.redd.it/m1.jpg?a=1&b=2")
            }
            other => panic!("expected gallery, got {other:?}"),
        }
    }

    #[test]
    fn nothing_resolves_to_none() {
        let mut post = Post::default();
        gallery(&mut post, &["m1"], &[]);
        assert_eq!(DisplayImage::resolve(&post), DisplayImage::None);
        let media = PostMedia::from_post(&post);
        assert!(!media.has_media_area());
        assert_eq!(media.tap_target(0), TapTarget::None);
    }

    #[test]
    fn single_resolvable_gallery_item_is_not_a_gallery() {
        let mut post = Post::default();
        gallery(&mut post, &["m1", "m2", "m3"], &["m1"]);
        let media = PostMedia::from_post(&post);
        assert!(!media.is_gallery());
        match media.tap_target(0) {
            TapTarget::Images { images, start } => {
                assert_eq!(images.len(), 1);
                assert_eq!(start, 0);
            }
            other => panic!("expected images, got {other:?}"),
        }
    }

    #[test]
    fn gallery_mode_skips_unresolvable_items() {
        let mut post = Post::default();
        gallery(&mut post, &["m1", "gone", "m3"], &["m1", "m3"]);
        let media = PostMedia::from_post(&post);
        assert!(media.is_gallery());
        assert_eq!(media.gallery.len(), 2);
        match media.tap_target(9) {
            TapTarget::Images { images, start } => {
                assert_eq!(images.len(), 2);
                assert_eq!(start, 1);
            }
            other => panic!("expected images, got {other:?}"),
        }
    }

    #[test]
    fn card_image_needs_the_first_gallery_item() {
        let mut post = Post::default();
        gallery(&mut post, &["gone", "m2", "m3"], &["m2", "m3"]);
        let media = PostMedia::from_post(&post);
        assert_eq!(media.image, DisplayImage::None);
        assert!(!media.has_media_area());
        assert!(media.is_gallery());
        assert_eq!(media.gallery.len(), 2);
    }

    #[test]
    fn video_wins_the_tap_even_with_preview() {
        let media = PostMedia::from_post(&video_post());
        assert!(matches!(media.image, DisplayImage::Preview(_)));
        match media.tap_target(0) {
            TapTarget::Video(video) => {
                assert!(video.url.ends_with("DASH_720.mp4?source=fallback"));
                assert_eq!(video.label, "Clip");
                assert_eq!(video.duration, 31.0);
            }
            other => panic!("expected video, got {other:?}"),
        }
    }

    #[test]
    fn video_requires_flag_and_url() {
        let mut post = video_post();
        post.is_video = false;
        assert!(video_source(&post).is_none());

        let mut post = video_post();
        post.media = Some(RawMedia {
            reddit_video: Some(RedditVideo::default()),
        });
        assert!(video_source(&post).is_none());
    }

    #[test]
    fn falls_back_to_hls_and_skips_failed_transcodes() {
        let mut video = RedditVideo {
            hls_url: "https://v.redd.it/x/HLSPlaylist.m3u8".into(),
            ..RedditVideo::default()
        };
        let source = from_reddit_video(&video, "t").unwrap();
        assert_eq!(source.url, "https://v.redd.it/x/HLSPlaylist.m3u8");
        video.transcoding_status = "error".into();
        assert!(from_reddit_video(&video, "t").is_none());
    }
}
