//! 画廊视图模型
//!
//! 访客网格、组织者面板和页头，只做数据整理，渲染交给调用方。

use crate::gallery::event::Event;
use crate::gallery::photo::Photo;
use crate::gallery::session::Session;

pub const EMPTY_GALLERY_MESSAGE: &str = "No photos yet. Be the first to share!";
pub const DEFAULT_PHOTO_ALT: &str = "Event photo";
pub const ADD_PHOTOS_LABEL: &str = "Add Photos";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoTile {
    pub id: String,
    pub url: String,
    pub alt: String,
    pub uploader: String,
}

impl PhotoTile {
    fn from_photo(photo: &Photo) -> Self {
        let alt = if photo.description.is_empty() {
            DEFAULT_PHOTO_ALT.to_string()
        } else {
            photo.description.clone()
        };
        Self {
            id: photo.id.clone(),
            url: photo.url.clone(),
            alt,
            uploader: photo.user_name.clone(),
        }
    }

    /// 面板上的署名
    pub fn caption(&self) -> String {
        format!("By: {}", self.uploader)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridTile {
    AddPhotos,
    Photo(PhotoTile),
}

/// 访客网格：首格为“添加照片”，其后按当前内存顺序排列
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestGrid {
    pub tiles: Vec<GridTile>,
    /// 没有照片时显示的占位文案
    pub empty_message: Option<&'static str>,
}

impl GuestGrid {
    pub fn build(photos: &[Photo]) -> Self {
        let tiles = std::iter::once(GridTile::AddPhotos)
            .chain(photos.iter().map(|p| GridTile::Photo(PhotoTile::from_photo(p))))
            .collect();
        Self {
            tiles,
            empty_message: photos.is_empty().then_some(EMPTY_GALLERY_MESSAGE),
        }
    }
}

pub fn photo_count_label(count: usize) -> String {
    if count == 1 {
        "1 photo".to_string()
    } else {
        format!("{} photos", count)
    }
}

/// 组织者面板
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dashboard {
    pub name: String,
    pub event_code: String,
    pub organizer_code: String,
    pub photo_count_label: String,
    pub tiles: Vec<PhotoTile>,
}

impl Dashboard {
    pub fn build(event: &Event, photos: &[Photo]) -> Self {
        Self {
            name: event.name.clone(),
            event_code: event.code.clone(),
            organizer_code: event.organizer_code.clone(),
            photo_count_label: photo_count_label(photos.len()),
            tiles: photos.iter().map(PhotoTile::from_photo).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cover {
    Image(String),
    Placeholder,
}

/// 页头：封面、活动名与欢迎语
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub cover: Cover,
    pub title: String,
    pub greeting: String,
    /// 只有组织者可以更换封面
    pub can_change_cover: bool,
}

impl Header {
    pub fn build(session: &Session) -> Option<Self> {
        let Session::Joined {
            event, user_name, ..
        } = session
        else {
            return None;
        };
        let cover = match &event.cover_image {
            Some(url) if !url.is_empty() => Cover::Image(url.clone()),
            _ => Cover::Placeholder,
        };
        Some(Self {
            cover,
            title: event.name.clone(),
            greeting: format!("Welcome, {}!", user_name),
            can_change_cover: session.is_organizer(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn photo(id: &str, description: &str) -> Photo {
        Photo {
            id: id.into(),
            event_id: "e1".into(),
            url: format!("https://cdn/{id}.jpg"),
            user_name: "Al".into(),
            description: description.into(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        }
    }

    fn event() -> Event {
        Event {
            id: "e1".into(),
            code: "ABC123".into(),
            name: "Wedding".into(),
            organizer_code: "ORG12345".into(),
            organizer_id: "organizer".into(),
            cover_image: None,
            created_at: None,
        }
    }

    #[test]
    fn guest_grid_starts_with_add_tile() {
        let grid = GuestGrid::build(&[photo("p2", ""), photo("p1", "cake")]);
        assert_eq!(grid.tiles.len(), 3);
        assert_eq!(grid.tiles[0], GridTile::AddPhotos);
        match &grid.tiles[1] {
            GridTile::Photo(tile) => {
                assert_eq!(tile.id, "p2");
                assert_eq!(tile.alt, DEFAULT_PHOTO_ALT);
            }
            other => panic!("unexpected tile {:?}", other),
        }
        assert!(grid.empty_message.is_none());
    }

    #[test]
    fn empty_grid_shows_placeholder() {
        let grid = GuestGrid::build(&[]);
        assert_eq!(grid.tiles, vec![GridTile::AddPhotos]);
        assert_eq!(grid.empty_message, Some(EMPTY_GALLERY_MESSAGE));
    }

    #[test]
    fn dashboard_shows_both_codes_and_count() {
        let dash = Dashboard::build(&event(), &[photo("p1", "")]);
        assert_eq!(dash.event_code, "ABC123");
        assert_eq!(dash.organizer_code, "ORG12345");
        assert_eq!(dash.photo_count_label, "1 photo");
        assert_eq!(dash.tiles[0].caption(), "By: Al");
        assert_eq!(photo_count_label(0), "0 photos");
    }

    #[test]
    fn header_reflects_role_and_cover() {
        assert!(Header::build(&Session::Anonymous).is_none());

        let guest = Header::build(&Session::guest(event(), "Al")).unwrap();
        assert_eq!(guest.greeting, "Welcome, Al!");
        assert_eq!(guest.cover, Cover::Placeholder);
        assert!(!guest.can_change_cover);

        let mut with_cover = event();
        with_cover.cover_image = Some("https://cdn/cover.png".into());
        let org = Header::build(&Session::organizer(with_cover)).unwrap();
        assert_eq!(org.cover, Cover::Image("https://cdn/cover.png".into()));
        assert!(org.can_change_cover);
    }
}
