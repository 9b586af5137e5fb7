/// Tissue classes predicted by the segmentation network, in ACDC label
/// order: 0=background, 1=right ventricle, 2=myocardium, 3=left ventricle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TissueClass {
    Background = 0,
    RightVentricle = 1,
    Myocardium = 2,
    LeftVentricle = 3,
}

impl TissueClass {
    pub const COUNT: usize = 4;

    pub const ALL: [TissueClass; Self::COUNT] = [
        TissueClass::Background,
        TissueClass::RightVentricle,
        TissueClass::Myocardium,
        TissueClass::LeftVentricle,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Background),
            1 => Some(Self::RightVentricle),
            2 => Some(Self::Myocardium),
            3 => Some(Self::LeftVentricle),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    /// RGB color used when painting mask overlays.
    pub fn color(self) -> [u8; 3] {
        match self {
            Self::Background => [0, 0, 0],
            Self::RightVentricle => [255, 0, 0],
            Self::Myocardium => [0, 255, 0],
            Self::LeftVentricle => [0, 0, 255],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CardiacPhase {
    EndDiastole,
    EndSystole,
}

impl CardiacPhase {
    pub fn abbreviation(self) -> &'static str {
        match self {
            Self::EndDiastole => "ED",
            Self::EndSystole => "ES",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_alphabet_round_trips() {
        for class in TissueClass::ALL {
            assert_eq!(TissueClass::from_u8(class.index()), Some(class));
        }
        assert_eq!(TissueClass::from_u8(4), None);
        assert_eq!(TissueClass::from_u8(255), None);
    }

    #[test]
    fn palette_matches_convention() {
        assert_eq!(TissueClass::Background.color(), [0, 0, 0]);
        assert_eq!(TissueClass::RightVentricle.color(), [255, 0, 0]);
        assert_eq!(TissueClass::Myocardium.color(), [0, 255, 0]);
        assert_eq!(TissueClass::LeftVentricle.color(), [0, 0, 255]);
    }
}
