use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    #[default]
    FullMeal,
    OneBowl,
    OnePlate,
    Bento,
}

impl Pattern {
    pub const ALL: [Self; 4] = [Self::FullMeal, Self::OneBowl, Self::OnePlate, Self::Bento];

    #[must_use]
    pub fn code(self) -> &'static str {
        self.spec().code
    }

    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.code() == code.trim())
    }

    /// Missing and unknown codes both fall back to `full_meal`.
    #[must_use]
    pub fn from_code_or_default(code: Option<&str>) -> Self {
        code.and_then(Self::from_code).unwrap_or_default()
    }

    /// Pattern recorded on a suggestion object, if any.
    #[must_use]
    pub fn of_recipe(recipe: &Value) -> Option<Self> {
        recipe.get("pattern").and_then(Value::as_str).and_then(Self::from_code)
    }

    #[must_use]
    pub fn spec(self) -> &'static PatternSpec {
        match self {
            Self::FullMeal => &PATTERNS[0],
            Self::OneBowl => &PATTERNS[1],
            Self::OnePlate => &PATTERNS[2],
            Self::Bento => &PATTERNS[3],
        }
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Everything that differs between patterns.
pub struct PatternSpec {
    pub code: &'static str,
    pub title: &'static str,
    pub rules: &'static [&'static str],
    /// Example suggestion array shown to the model.
    pub suggestion_shape: &'static str,
    /// Example detail object shown to the model.
    pub detail_shape: &'static str,
    /// Key used inside `ingredients` and `cooking_steps` of a detail object.
    pub detail_key: &'static str,
    /// Fill the `dishes` object with this pattern's keys.
    pub normalize_dishes: fn(&mut Map<String, Value>),
    /// Bullet lines naming the dishes of a chosen suggestion.
    pub dish_header: fn(&Value) -> String,
}

static PATTERNS: [PatternSpec; 4] = [
    PatternSpec {
        code: "full_meal",
        title: "しっかり一食（主菜・副菜・汁物）",
        rules: &["各献立は「主菜」「副菜」「汁物」で構成する"],
        suggestion_shape: r#"[
  {
    "menu_name": "献立名A",
    "pattern": "full_meal",
    "dishes": { "main": "主菜名", "side": "副菜名", "soup": "汁物名" },
    "comment": "家族情報や要望を踏まえた楽しい提案コメント（絵文字入り）",
    "cooking_time": "約xx分",
    "nutrients": {
      "summary": "この一食の目安栄養素の説明",
      "energy": "xxx kcal",
      "protein": "xx g",
      "fat": "xx g",
      "carbohydrates": "xx g",
      "salt_equivalent": "x.x g"
    }
  }
]"#,
        detail_shape: r#"{
  "shopping_list": ["品目1 (数量)", "品目2 (数量)"],
  "ingredients": {
    "main": ["主菜の材料1", "主菜の材料2"],
    "side": ["副菜の材料1"],
    "soup": ["汁物の材料1"]
  },
  "cooking_steps": {
    "main": [{"step": "主菜のステップ1", "time": "5分", "heat": "中火"}],
    "side": [{"step": "副菜のステップ1", "time": "3分", "heat": "弱火"}],
    "soup": [{"step": "汁物のステップ1", "time": "4分", "heat": "強火"}]
  }
}"#,
        detail_key: "main",
        normalize_dishes: full_meal_dishes,
        dish_header: full_meal_header,
    },
    PatternSpec {
        code: "one_bowl",
        title: "一品で満足！どんぶり・麺類",
        rules: &["どんぶり、麺類、ワンボウルで完結する主食系の一品料理に限定する"],
        suggestion_shape: r#"[
  {
    "menu_name": "メニュー名A",
    "pattern": "one_bowl",
    "dishes": { "single": "どんぶり/麺類の料理名" },
    "comment": "家族情報や要望を踏まえた楽しい提案コメント（絵文字入り）",
    "cooking_time": "約xx分",
    "nutrients": {
      "summary": "この一食の目安栄養素の説明",
      "energy": "xxx kcal",
      "protein": "xx g",
      "fat": "xx g",
      "carbohydrates": "xx g",
      "salt_equivalent": "x.x g"
    }
  }
]"#,
        detail_shape: r#"{
  "shopping_list": ["品目1 (数量)"],
  "ingredients": { "single": ["材料1", "材料2"] },
  "cooking_steps": {
    "single": [{"step": "一品料理のステップ1", "time": "5分", "heat": "中火"}]
  }
}"#,
        detail_key: "single",
        normalize_dishes: one_bowl_dishes,
        dish_header: one_bowl_header,
    },
    PatternSpec {
        code: "one_plate",
        title: "カフェ風ワンプレートランチ",
        rules: &[
            "1つの皿で見た目も楽しめる盛り付けを意識する",
            "主食＋主菜＋副菜を1皿にまとめても良い",
        ],
        suggestion_shape: r#"[
  {
    "menu_name": "プレート名A",
    "pattern": "one_plate",
    "dishes": { "plate": "プレートの内容（例: タコライス、サラダ、スープ付き など）" },
    "comment": "家族情報や要望を踏まえた楽しい提案コメント（絵文字入り）",
    "cooking_time": "約xx分",
    "nutrients": {
      "summary": "この一食の目安栄養素の説明",
      "energy": "xxx kcal",
      "protein": "xx g",
      "fat": "xx g",
      "carbohydrates": "xx g",
      "salt_equivalent": "x.x g"
    }
  }
]"#,
        detail_shape: r#"{
  "shopping_list": ["品目1 (数量)"],
  "ingredients": { "plate": ["材料1", "材料2"] },
  "cooking_steps": {
    "plate": [{"step": "下準備", "time": "5分", "heat": "-"}, {"step": "盛り付け", "time": "3分", "heat": "-"}]
  }
}"#,
        detail_key: "plate",
        normalize_dishes: one_plate_dishes,
        dish_header: one_plate_header,
    },
    PatternSpec {
        code: "bento",
        title: "品数豊富なお弁当",
        rules: &[
            "持ち運びやすく冷めても美味しいおかずを中心に構成する",
            "メイン1品＋副菜2-3品＋彩りを意識する",
        ],
        suggestion_shape: r#"[
  {
    "menu_name": "お弁当名A",
    "pattern": "bento",
    "dishes": { "items": ["おかず1", "おかず2", "おかず3"] },
    "comment": "家族情報や要望を踏まえた楽しい提案コメント（絵文字入り）",
    "cooking_time": "約xx分",
    "nutrients": {
      "summary": "この一食の目安栄養素の説明",
      "energy": "xxx kcal",
      "protein": "xx g",
      "fat": "xx g",
      "carbohydrates": "xx g",
      "salt_equivalent": "x.x g"
    }
  }
]"#,
        detail_shape: r#"{
  "shopping_list": ["品目1 (数量)"],
  "ingredients": { "items": [["おかず1材料1"],["おかず2材料1"]] },
  "cooking_steps": {
    "items": [[{"step": "おかず1の手順1", "time": "5分", "heat": "中火"}], [{"step": "おかず2の手順1", "time": "3分", "heat": "弱火"}]]
  }
}"#,
        detail_key: "items",
        normalize_dishes: bento_dishes,
        dish_header: bento_header,
    },
];

fn default_string(dishes: &mut Map<String, Value>, key: &str) {
    let entry = dishes.entry(key).or_insert(Value::Null);
    if entry.is_null() {
        *entry = Value::String(String::new());
    }
}

fn full_meal_dishes(dishes: &mut Map<String, Value>) {
    for key in ["main", "side", "soup"] {
        default_string(dishes, key);
    }
}

fn one_bowl_dishes(dishes: &mut Map<String, Value>) {
    default_string(dishes, "single");
}

fn one_plate_dishes(dishes: &mut Map<String, Value>) {
    default_string(dishes, "plate");
}

fn bento_dishes(dishes: &mut Map<String, Value>) {
    let items = dishes.entry("items").or_insert(Value::Null);
    if !items.is_array() {
        // A lone string is one item, anything else is nothing.
        *items = match items.take() {
            Value::String(s) if !s.is_empty() => Value::Array(vec![Value::String(s)]),
            _ => Value::Array(Vec::new()),
        };
    }
}

fn dish_name<'a>(dishes: &'a Value, key: &str) -> &'a str {
    dishes.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn full_meal_header(dishes: &Value) -> String {
    format!(
        "- 主菜 (main): {}\n- 副菜 (side): {}\n- 汁物 (soup): {}",
        dish_name(dishes, "main"),
        dish_name(dishes, "side"),
        dish_name(dishes, "soup"),
    )
}

fn one_bowl_header(dishes: &Value) -> String {
    format!("- 一品 (single): {}", dish_name(dishes, "single"))
}

fn one_plate_header(dishes: &Value) -> String {
    format!("- ワンプレート (plate): {}", dish_name(dishes, "plate"))
}

fn bento_header(dishes: &Value) -> String {
    let items: Vec<&str> = dishes
        .get("items")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    format!("- お弁当おかず (items): {}", items.join(", "))
}
