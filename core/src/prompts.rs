use std::fmt::Write as _;

use serde_json::Value;

use crate::models::FamilyMember;
use crate::pattern::Pattern;

/// Stand-in for an empty free-text request.
pub const NO_REQUEST: &str = "特にありません";

const NO_INGREDIENTS: &str = "なし";

#[must_use]
pub fn suggestion_prompt(
    family: &[FamilyMember],
    ingredients: &[String],
    request: &str,
    pattern: Pattern,
) -> String {
    let spec = pattern.spec();
    let request = if request.trim().is_empty() {
        NO_REQUEST
    } else {
        request.trim()
    };
    let ingredients = if ingredients.is_empty() {
        NO_INGREDIENTS.to_string()
    } else {
        ingredients.join(", ")
    };

    let mut roster = String::new();
    for m in family {
        let _ = writeln!(
            roster,
            "- {} ({}, {}歳, {}cm, {}kg) 嫌いなもの: {}",
            m.name, m.gender, m.age, m.height, m.weight, m.dislikes
        );
    }

    let mut rules = String::new();
    for rule in spec.rules {
        let _ = writeln!(rules, "  - {rule}");
    }

    format!(
        "## 役割
あなたはプロの栄養士兼シェフです。JSON形式でデータを返すAPIとして機能してください。

## データベース情報
### 家族構成
{roster}### 現在ある食材
{ingredients}

## ユーザーからの追加要望
{request}

## 献立パターン
- コード: {code}
- タイトル: {title}

## 命令
上記の情報をすべて考慮し、指定のパターン({title})に適合するおすすめの献立を3つ提案してください。

### 厳格なルール
- **最重要:** 出力は必ず指定されたJSON形式の配列のみとし、前後の説明文、マークダウン(```)、その他のテキストは一切含めないでください。
- 家族の嫌いな食材は絶対に使用しないでください。
- 現在ある食材をなるべく活用してください。
- 以下のパターン固有ルールを必ず守ってください:
{rules}- 家族全員の栄養バランスを考慮してください。

### 提案コメントの要件
- 各献立に「comment」を含め、依頼内容({request})や家族情報を踏まえた楽しく親しみやすい文章にしてください。
- 絵文字をほどよく使ってください（例: 🍚🥗🍜✨）。
- 2〜3文、約40〜80文字を目安にしてください。

### 調理時間の要件
- 各献立に「cooking_time」を含め、全体の目安調理時間（例: 約20分）を日本語で簡潔に記載してください。

### JSON形式
{shape}
",
        code = spec.code,
        title = spec.title,
        shape = spec.suggestion_shape,
    )
}

#[must_use]
pub fn detail_prompt(
    selected_menu: &Value,
    ingredients: &[String],
    servings: &str,
    pattern: Pattern,
) -> String {
    let spec = pattern.spec();
    let dishes = selected_menu.get("dishes").unwrap_or(&Value::Null);

    format!(
        "## 役割
あなたはJSON形式でデータを返すAPIとして機能する、プロの料理研究家です。

## 与えられた情報
### 作る献立
{header}
### 現在家にある食材
{ingredients}

## 命令
上記の情報を基に、「買い物リスト」と「調理手順」を生成してください。想定人数は「{servings}」です。材料の量や工程の記述はこの人数を前提にしてください。

### 厳格なルール
- **最重要:** 出力は必ず指定されたJSON形式のみとし、前後の説明文、マークダウン(```)、その他のテキストは一切含めないでください。
- 買い物リスト(shopping_list)は、献立を作る上で不足している食材と量をリストアップしてください。家に今ある食材で足りる場合は、空の配列 `[]` を返してください。

### 2. 調理手順 (cooking_steps)
- 指定されたパターン({code})に合わせたキー構成で返してください。
- 例: full_mealなら main/side/soup、one_bowlなら single、one_plateなら plate、bentoなら items。
- 各ステップはオブジェクトで、`step`（手順の説明）, `time`（目安時間）, `heat`（火加減: 強火/中火/弱火または不要なら\"-\"）を含めてください。

### 3. 各料理ごとの材料 (ingredients)
- 各料理（またはおかず）に必要な材料リストを配列で返してください。

### JSON形式
{shape}
",
        header = (spec.dish_header)(dishes),
        ingredients = ingredients.join(", "),
        code = spec.code,
        shape = spec.detail_shape,
    )
}

pub const PHOTO_PROMPT: &str = r#"## 役割
あなたは画像から食品・食材を認識し、JSONで返すAPIです。

## 指示
- 画像に写っている「食材・食品」の候補を抽出してください。
- 結果は必ず配列のJSONで返してください。
- 各要素は以下の形式とします:
  {
    "name": "食材名（日本語、一般名称。例: 玉ねぎ, 牛乳, 卵）",
    "category": "肉・魚 | 野菜・果物 | 調味料 | その他 のいずれか",
    "maybe": true/false // 不確かならtrue
  }
- 同じものが複数写っていても重複させずユニークにまとめてください。
- 製品名が写っている場合は一般的な食材名に正規化してください（例: "キッコーマンしょうゆ" → "しょうゆ"）。
- 出力はJSONのみ。前後に説明やマークダウンを含めないでください。
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn member(name: &str, dislikes: &str) -> FamilyMember {
        FamilyMember {
            id: 1,
            user_id: "u".to_string(),
            name: name.to_string(),
            age: 8,
            gender: "男性".to_string(),
            height: 128.5,
            weight: 26.0,
            dislikes: dislikes.to_string(),
            created_at: String::new(),
        }
    }

    #[test]
    fn test_suggestion_prompt_contents() {
        let prompt = suggestion_prompt(
            &[member("太郎", "ピーマン")],
            &["豚肉".to_string(), "キャベツ".to_string()],
            "",
            Pattern::Bento,
        );
        assert!(prompt.contains("- 太郎 (男性, 8歳, 128.5cm, 26kg) 嫌いなもの: ピーマン"));
        assert!(prompt.contains("豚肉, キャベツ"));
        assert!(prompt.contains(NO_REQUEST));
        assert!(prompt.contains("- コード: bento"));
        assert!(prompt.contains("指定のパターン(品数豊富なお弁当)"));
        assert!(prompt.contains("  - 持ち運びやすく冷めても美味しいおかずを中心に構成する\n"));
        assert!(prompt.contains("\"items\": [\"おかず1\""));
    }

    #[test]
    fn test_suggestion_prompt_without_ingredients() {
        let prompt = suggestion_prompt(&[], &[], "辛くないもの", Pattern::FullMeal);
        assert!(prompt.contains("### 現在ある食材\nなし"));
        assert!(prompt.contains("辛くないもの"));
        assert!(prompt.contains("各献立は「主菜」「副菜」「汁物」で構成する"));
    }

    #[test]
    fn test_blank_request_placeholder() {
        assert_eq!(NO_REQUEST, "特にありません");
        let prompt = suggestion_prompt(&[], &[], "", Pattern::Bento);
        assert!(prompt.contains("特にありません"));
        assert!(prompt.contains("持ち運びやすく冷めても美味しいおかずを中心に構成する"));
    }

    #[test]
    fn test_detail_prompt_contents() {
        let menu = json!({ "pattern": "one_bowl", "dishes": { "single": "親子丼" } });
        let prompt = detail_prompt(&menu, &["卵".to_string()], "3人前", Pattern::OneBowl);
        assert!(prompt.contains("- 一品 (single): 親子丼"));
        assert!(prompt.contains("想定人数は「3人前」"));
        assert!(prompt.contains("### 現在家にある食材\n卵\n"));
        assert!(prompt.contains("\"single\": [\"材料1\""));
    }
}
