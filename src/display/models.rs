use serde::{Deserialize, Serialize};

/// The id of the shared default display whose config values serve as
/// fallbacks for every real display.
pub const DEFAULT_DISPLAY_ID: i64 = 0;

/// A managed e-ink display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Display {
    pub id: i64,
    pub name: String,
    /// Panel width in pixels, before rotation.
    pub width: u32,
    /// Panel height in pixels, before rotation.
    pub height: u32,
    /// Rotation in degrees (0, 90, 180, 270).
    pub rotation: u32,
}

impl Display {
    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_DISPLAY_ID
    }

    /// Width of the rendered page, accounting for rotation.
    pub fn virtual_width(&self) -> u32 {
        if self.rotation % 180 == 0 {
            self.width
        } else {
            self.height
        }
    }

    /// Height of the rendered page, accounting for rotation.
    pub fn virtual_height(&self) -> u32 {
        if self.rotation % 180 == 0 {
            self.height
        } else {
            self.width
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display(rotation: u32) -> Display {
        Display {
            id: 1,
            name: "kitchen".to_string(),
            width: 800,
            height: 480,
            rotation,
        }
    }

    #[test]
    fn test_virtual_size_no_rotation() {
        let d = display(0);
        assert_eq!(d.virtual_width(), 800);
        assert_eq!(d.virtual_height(), 480);
    }

    #[test]
    fn test_virtual_size_rotated() {
        let d = display(90);
        assert_eq!(d.virtual_width(), 480);
        assert_eq!(d.virtual_height(), 800);

        let d = display(270);
        assert_eq!(d.virtual_width(), 480);
        assert_eq!(d.virtual_height(), 800);
    }

    #[test]
    fn test_virtual_size_upside_down() {
        let d = display(180);
        assert_eq!(d.virtual_width(), 800);
        assert_eq!(d.virtual_height(), 480);
    }

    #[test]
    fn test_default_display() {
        let mut d = display(0);
        assert!(!d.is_default());
        d.id = DEFAULT_DISPLAY_ID;
        assert!(d.is_default());
    }
}
