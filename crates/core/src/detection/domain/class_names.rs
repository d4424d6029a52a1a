/// COCO-80 class names in YOLOv8 index order.
pub const COCO_CLASS_NAMES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Class index to label table for a detection model.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassNames {
    names: Vec<String>,
}

impl ClassNames {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn coco() -> Self {
        Self::new(COCO_CLASS_NAMES.iter().map(|s| s.to_string()).collect())
    }

    /// Parses the `names` metadata entry written by Ultralytics exports,
    /// e.g. `{0: 'person', 1: 'bicycle'}`.
    ///
    /// Returns `None` unless the indices are exactly `0..n`.
    pub fn from_ultralytics_metadata(raw: &str) -> Option<Self> {
        let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
        let mut entries: Vec<(usize, String)> = Vec::new();
        let mut rest = body.trim_start();

        while !rest.is_empty() {
            let colon = rest.find(':')?;
            let index: usize = rest[..colon].trim().parse().ok()?;
            let after = rest[colon + 1..].trim_start();

            let quote = after.chars().next().filter(|c| *c == '\'' || *c == '"')?;
            let value = &after[1..];
            let end = value.find(quote)?;
            entries.push((index, value[..end].to_string()));

            rest = value[end + 1..].trim_start();
            rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
        }

        if entries.is_empty() {
            return None;
        }
        entries.sort_by_key(|(i, _)| *i);
        if entries.iter().enumerate().any(|(pos, (i, _))| pos != *i) {
            return None;
        }
        Some(Self::new(entries.into_iter().map(|(_, n)| n).collect()))
    }

    pub fn get(&self, class_id: usize) -> Option<&str> {
        self.names.get(class_id).map(String::as_str)
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.names.iter().position(|n| n == label)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for ClassNames {
    fn default() -> Self {
        Self::coco()
    }
}
